//! Submission client.
//!
//! Wraps every ledger-mutating call with retry-on-conflict. The retry
//! loop runs on its own task, so a caller that stops waiting does not
//! cancel a write already admitted into the loop.

use chaincode::CallerContext;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::{LedgerGateway, TxReceipt};
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct SubmissionClient {
    gateway: Arc<dyn LedgerGateway>,
    policy: RetryPolicy,
}

impl SubmissionClient {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self::with_policy(gateway, RetryPolicy::default())
    }

    pub fn with_policy(gateway: Arc<dyn LedgerGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    /// Submit a transaction, retrying on conflict.
    pub async fn submit(
        &self,
        caller: &CallerContext,
        function: &str,
        args: Vec<String>,
    ) -> Result<TxReceipt> {
        let gateway = Arc::clone(&self.gateway);
        let policy = self.policy.clone();
        let caller = caller.clone();
        let function = function.to_string();

        let task = tokio::spawn(async move {
            submit_with_retry(gateway.as_ref(), &policy, &caller, &function, &args).await
        });

        task.await
            .map_err(|e| GatewayError::Unavailable(format!("Submission task failed: {e}")))?
    }

    /// Evaluate a read-only call. Never retried.
    pub async fn evaluate(
        &self,
        caller: &CallerContext,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        self.gateway.evaluate(caller, function, args).await
    }
}

/// Run one submission through the retry policy on the current task.
pub async fn submit_with_retry(
    gateway: &dyn LedgerGateway,
    policy: &RetryPolicy,
    caller: &CallerContext,
    function: &str,
    args: &[String],
) -> Result<TxReceipt> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match gateway.submit(caller, function, args).await {
            Ok(receipt) => {
                if attempt > 1 {
                    info!(function = %function, attempt, "Submission succeeded after retry");
                }
                return Ok(receipt);
            }
            Err(e) if e.is_conflict() => {
                let key = e.conflict_key().unwrap_or_default().to_string();
                if attempt >= max_attempts {
                    warn!(
                        function = %function,
                        key = %key,
                        attempts = attempt,
                        "Conflict persisted, giving up"
                    );
                    return Err(GatewayError::ConflictAfterRetries {
                        key,
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    function = %function,
                    key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "MVCC conflict, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyGateway;
    use chaincode::ErrorKind;
    use tokio_test::{assert_err, assert_ok};

    fn client(gateway: Arc<FlakyGateway>) -> SubmissionClient {
        SubmissionClient::with_policy(gateway, RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn test_recovers_after_transient_conflicts() {
        let flaky = Arc::new(FlakyGateway::echo().with_conflicts(2));
        let receipt = assert_ok!(
            client(flaky.clone())
                .submit(&CallerContext::admin("root", "Org1MSP"), "Ping", vec![])
                .await
        );
        assert_eq!(flaky.attempts(), 3);
        assert_eq!(receipt.payload, b"\"Ping\"");
    }

    #[tokio::test]
    async fn test_persistent_conflict_stops_at_three() {
        let flaky = Arc::new(FlakyGateway::echo().with_conflicts(u32::MAX));
        let err = assert_err!(
            client(flaky.clone())
                .submit(&CallerContext::admin("root", "Org1MSP"), "Ping", vec![])
                .await
        );

        assert_eq!(flaky.attempts(), 3);
        assert!(matches!(err, GatewayError::ConflictAfterRetries { attempts: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_non_conflict_errors_are_not_retried() {
        let flaky = Arc::new(FlakyGateway::echo().with_unavailable(true));
        let err = assert_err!(
            client(flaky.clone())
                .submit(&CallerContext::admin("root", "Org1MSP"), "Ping", vec![])
                .await
        );
        assert_eq!(flaky.attempts(), 1);
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_write() {
        let flaky = Arc::new(FlakyGateway::echo().with_conflicts(1));
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step_ms: 20,
        };
        let client = SubmissionClient::with_policy(flaky.clone(), policy);
        let caller = CallerContext::admin("root", "Org1MSP");

        // Caller gives up during the backoff
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(5),
            client.submit(&caller, "Ping", vec![]),
        )
        .await;

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(flaky.attempts(), 2);
        assert_eq!(flaky.successes(), 1);
    }
}
