//! Contract-level properties exercised through the positional surface
//!
//! Covers:
//! - Idempotent registration
//! - Version monotonicity across mutating operations
//! - Revoked as a sticky terminal state
//! - Expiry derivation on verify
//! - Two writers racing on one record

use chaincode::{
    invoke, CallerContext, ContractError, LedgerStore, MemoryLedger, TouristContract,
    TouristRecord, TouristStatus, TxStub, VerificationResult,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

struct Ledger {
    store: Arc<dyn LedgerStore>,
    contract: TouristContract,
    now: DateTime<Utc>,
    seq: u32,
}

impl Ledger {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryLedger::new()),
            contract: TouristContract::default(),
            now: Utc::now(),
            seq: 0,
        }
    }

    fn stub(&mut self) -> TxStub {
        self.seq += 1;
        self.now += Duration::milliseconds(250);
        TxStub::new(self.store.clone(), format!("tx-{}", self.seq), self.now)
    }

    async fn submit(
        &mut self,
        caller: &CallerContext,
        function: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ContractError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut stub = self.stub();
        let out = invoke(&self.contract, caller, &mut stub, function, &args).await?;
        stub.commit().await?;
        Ok(out)
    }

    async fn evaluate(
        &mut self,
        caller: &CallerContext,
        function: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ContractError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut stub = self.stub();
        invoke(&self.contract, caller, &mut stub, function, &args).await
    }

    async fn record(&mut self, id: &str) -> TouristRecord {
        let bytes = self.evaluate(&admin(), "GetTourist", &[id]).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn verify(&mut self, id: &str) -> VerificationResult {
        let bytes = self
            .submit(&CallerContext::tourist("kiosk", "Org3MSP"), "VerifyTourist", &[id])
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(&mut self, id: &str, days: i64) -> Result<Vec<u8>, ContractError> {
        let expiry = (self.now + Duration::days(days)).to_rfc3339();
        let hash = "4f".repeat(32);
        self.submit(
            &issuer(),
            "RegisterTourist",
            &[
                id,
                &hash,
                r#"{"destinations":[{"location":"Shillong","startDate":"2025-10-01T00:00:00Z","endDate":"2025-10-05T00:00:00Z"}]}"#,
                r#"[{"name":"Mira","phone":"+91 99999 00000","email":"mira@example.com"}]"#,
                &expiry,
                "{}",
            ],
        )
        .await
    }
}

fn issuer() -> CallerContext {
    CallerContext::issuer("desk-1", "Org1MSP")
}

fn police() -> CallerContext {
    CallerContext::police("officer-3", "Org2MSP")
}

fn admin() -> CallerContext {
    CallerContext::admin("root", "Org1MSP")
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_registration_is_idempotent() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();

    let err = ledger.register("t1", 30).await.unwrap_err();
    assert!(matches!(err, ContractError::AlreadyExists(_)));
    assert!(!err.kind().is_retryable());

    let bytes = ledger
        .evaluate(&admin(), "GetAllTourists", &["100", ""])
        .await
        .unwrap();
    let page: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(page["fetchedRecordsCount"], 1);
}

// =============================================================================
// Versioning
// =============================================================================

#[tokio::test]
async fn test_version_increments_by_one_per_mutation() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();

    let steps: Vec<(CallerContext, &str, Vec<&str>)> = vec![
        (police(), "UpdateTourist", vec!["t1", r#"{"metadata":{"note":"checked-in"}}"#]),
        (police(), "SuspendTourist", vec!["t1", "flagged"]),
        (police(), "ReinstateTourist", vec!["t1"]),
        (issuer(), "UpdateTourist", vec!["t1", r#"{"emergencyContacts":[{"name":"Ila","phone":"0123456789"}]}"#]),
        (admin(), "SuspendTourist", vec!["t1"]),
    ];

    let mut previous = ledger.record("t1").await;
    assert_eq!(previous.version(), 1);

    for (caller, function, args) in steps {
        ledger.submit(&caller, function, &args).await.unwrap();
        let current = ledger.record("t1").await;
        assert_eq!(current.version(), previous.version() + 1, "{function}");
        assert!(current.updated_at >= previous.updated_at, "{function}");
        previous = current;
    }
}

#[tokio::test]
async fn test_failed_operation_writes_nothing() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();

    let err = ledger
        .submit(&police(), "UpdateTourist", &["t1", r#"{"emergencyContacts":[{"name":"X","phone":"1"}]}"#])
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::Validation(_)));
    assert_eq!(ledger.record("t1").await.version(), 1);
}

// =============================================================================
// Status machine
// =============================================================================

#[tokio::test]
async fn test_t1_scenario() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();

    let verified = ledger.verify("t1").await;
    assert!(verified.valid);
    assert_eq!(verified.status, TouristStatus::Active);

    ledger
        .submit(&police(), "SuspendTourist", &["t1", "flagged"])
        .await
        .unwrap();
    let verified = ledger.verify("t1").await;
    assert!(!verified.valid);
    assert_eq!(verified.status, TouristStatus::Suspended);

    ledger
        .submit(&police(), "ReinstateTourist", &["t1"])
        .await
        .unwrap();
    assert_eq!(ledger.record("t1").await.status, TouristStatus::Active);
}

#[tokio::test]
async fn test_revoked_never_returns() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();
    ledger
        .submit(&issuer(), "RevokeTourist", &["t1", "document fraud"])
        .await
        .unwrap();

    let attempts: Vec<(CallerContext, &str, Vec<&str>)> = vec![
        (admin(), "ReinstateTourist", vec!["t1"]),
        (police(), "SuspendTourist", vec!["t1"]),
        (admin(), "UpdateTourist", vec!["t1", "{}"]),
        (admin(), "RevokeTourist", vec!["t1"]),
    ];
    for (caller, function, args) in attempts {
        assert!(ledger.submit(&caller, function, &args).await.is_err(), "{function}");
        assert_eq!(ledger.record("t1").await.status, TouristStatus::Revoked);
    }
}

#[tokio::test]
async fn test_expired_verify_is_invalid_regardless_of_stored_status() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 1).await.unwrap();
    ledger.now += Duration::days(2);

    let verified = ledger.verify("t1").await;
    assert!(!verified.valid);
    assert_eq!(verified.status, TouristStatus::Expired);
    // Stored status stays active; only the derived view changes
    assert_eq!(ledger.record("t1").await.version(), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_two_writers_on_same_record_one_conflicts() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();

    let contract = TouristContract::default();
    let mut first = ledger.stub();
    let mut second = ledger.stub();

    contract
        .suspend_tourist(&police(), &mut first, "t1", Some("a".into()))
        .await
        .unwrap();
    contract
        .suspend_tourist(&admin(), &mut second, "t1", Some("b".into()))
        .await
        .unwrap();

    assert!(first.commit().await.is_ok());
    let err = second.commit().await.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.kind().is_retryable());

    let record = ledger.record("t1").await;
    assert_eq!(record.version(), 2);
    assert_eq!(record.metadata.suspension_reason.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_concurrent_location_writes_conflict_on_tourist_key() {
    let mut ledger = Ledger::new();
    ledger.register("t1", 30).await.unwrap();

    let contract = TouristContract::default();
    let mut a = ledger.stub();
    let mut b = ledger.stub();
    for (stub, id) in [(&mut a, "loc-a"), (&mut b, "loc-b")] {
        contract
            .record_event(
                &police(),
                stub,
                chaincode::EventType::Location,
                id,
                "t1",
                serde_json::json!({"lat": 25.5, "lon": 91.9}),
            )
            .await
            .unwrap();
    }

    assert!(a.commit().await.is_ok());
    assert!(b.commit().await.unwrap_err().is_conflict());
}
