//! Submission client integration tests
//!
//! Runs the typed ledger façade against an embedded peer, with and
//! without injected conflicts.

use chaincode::{
    CallerContext, EmergencyContact, ErrorKind, EventType, Itinerary, MemoryLedger,
    RegisterTourist, TouristContract, TouristStatus,
};
use chrono::{Duration, Utc};
use ledger_gateway::{
    EmbeddedPeer, FlakyGateway, GatewayError, LedgerGateway, RetryPolicy, SubmissionClient,
    TouristLedger,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn issuer() -> CallerContext {
    CallerContext::issuer("desk-1", "Org1MSP")
}

fn police() -> CallerContext {
    CallerContext::police("officer-3", "Org2MSP")
}

fn request(id: &str) -> RegisterTourist {
    RegisterTourist {
        tourist_id: id.to_string(),
        kyc_hash: "9a".repeat(32),
        itinerary: Itinerary::default(),
        emergency_contacts: vec![EmergencyContact {
            name: "Leela".into(),
            relationship: Some("mother".into()),
            phone: "+91 91234 56789".into(),
            email: None,
        }],
        expiry_at: (Utc::now() + Duration::days(30)).to_rfc3339(),
        metadata: BTreeMap::new(),
    }
}

fn setup() -> (Arc<FlakyGateway>, TouristLedger) {
    let peer: Arc<dyn LedgerGateway> = Arc::new(EmbeddedPeer::new(
        Arc::new(MemoryLedger::new()),
        TouristContract::default(),
    ));
    let flaky = Arc::new(FlakyGateway::wrapping(peer));
    let client = SubmissionClient::with_policy(flaky.clone(), RetryPolicy::immediate(3));
    (flaky, TouristLedger::new(client))
}

#[tokio::test]
async fn test_typed_lifecycle() {
    let (_, ledger) = setup();

    let registered = ledger.register(&issuer(), &request("t1")).await.unwrap();
    assert_eq!(registered.value.version(), 1);
    assert!(!registered.chain_tx.tx_id.is_empty());

    let event = ledger
        .record_event(
            &police(),
            EventType::Location,
            "loc-1",
            "t1",
            &serde_json::json!({"lat": 26.1, "lon": 91.7}),
        )
        .await
        .unwrap();
    assert_eq!(event.value.event_type, EventType::Location);

    let suspended = ledger.suspend(&police(), "t1", Some("flagged")).await.unwrap();
    assert_eq!(suspended.value.status, TouristStatus::Suspended);

    let verification = ledger.verify(&police(), "t1").await.unwrap();
    assert!(!verification.valid);

    let history = ledger.history(&police(), "t1").await.unwrap();
    // register, location refresh, suspend
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_transient_conflicts_are_absorbed() {
    let (flaky, ledger) = setup();
    flaky.inject_conflicts(2);

    ledger.register(&issuer(), &request("t1")).await.unwrap();
    assert_eq!(flaky.attempts(), 3);
    assert!(ledger.exists(&issuer(), "t1").await.unwrap());
}

#[tokio::test]
async fn test_conflict_retry_bound_is_exactly_three() {
    let (flaky, ledger) = setup();
    flaky.inject_conflicts(u32::MAX);

    let err = ledger.register(&issuer(), &request("t1")).await.unwrap_err();
    assert_eq!(flaky.attempts(), 3);
    assert!(matches!(err, GatewayError::ConflictAfterRetries { attempts: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    flaky.inject_conflicts(0);
    assert!(!ledger.exists(&issuer(), "t1").await.unwrap());
}

#[tokio::test]
async fn test_business_errors_fail_fast() {
    let (flaky, ledger) = setup();
    ledger.register(&issuer(), &request("t1")).await.unwrap();

    let err = ledger.register(&issuer(), &request("t1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(flaky.attempts(), 2);

    let err = ledger.reinstate(&police(), "t1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!err.is_retryable());
}
