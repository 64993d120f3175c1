//! Fault-injecting gateway for tests.

use async_trait::async_trait;
use chaincode::{CallerContext, ContractError};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::gateway::{ChainTx, LedgerGateway, TxReceipt};

/// Gateway that injects conflicts or outages before delegating.
///
/// Without an inner gateway it echoes the function name back as the
/// JSON payload.
pub struct FlakyGateway {
    inner: Option<Arc<dyn LedgerGateway>>,
    conflicts_remaining: AtomicU32,
    unavailable: AtomicBool,
    attempts: AtomicU32,
    successes: AtomicU32,
    block: AtomicU64,
}

impl FlakyGateway {
    /// Wrap a real gateway.
    pub fn wrapping(inner: Arc<dyn LedgerGateway>) -> Self {
        Self::build(Some(inner))
    }

    /// Stand-alone gateway that echoes.
    pub fn echo() -> Self {
        Self::build(None)
    }

    fn build(inner: Option<Arc<dyn LedgerGateway>>) -> Self {
        Self {
            inner,
            conflicts_remaining: AtomicU32::new(0),
            unavailable: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            block: AtomicU64::new(0),
        }
    }

    /// Fail the next `n` submissions with a conflict. `u32::MAX` never stops.
    pub fn with_conflicts(self, n: u32) -> Self {
        self.inject_conflicts(n);
        self
    }

    pub fn with_unavailable(self, unavailable: bool) -> Self {
        self.set_unavailable(unavailable);
        self
    }

    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts_remaining.store(n, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Submissions attempted so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Submissions that went through.
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(GatewayError::Unavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerGateway for FlakyGateway {
    async fn submit(
        &self,
        caller: &CallerContext,
        function: &str,
        args: &[String],
    ) -> Result<TxReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.take_conflict() {
            return Err(ContractError::Conflict {
                key: format!("injected:{function}"),
            }
            .into());
        }

        let receipt = match &self.inner {
            Some(inner) => inner.submit(caller, function, args).await?,
            None => TxReceipt {
                payload: serde_json::to_vec(function)?,
                chain_tx: ChainTx {
                    tx_id: uuid::Uuid::new_v4().simple().to_string(),
                    block_number: self.block.fetch_add(1, Ordering::SeqCst) + 1,
                    timestamp: Utc::now(),
                },
                event: None,
            },
        };
        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(receipt)
    }

    async fn evaluate(
        &self,
        caller: &CallerContext,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        self.check_available()?;
        match &self.inner {
            Some(inner) => inner.evaluate(caller, function, args).await,
            None => Ok(serde_json::to_vec(function)?),
        }
    }
}
