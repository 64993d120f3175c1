//! Tourist Identity Contract
//!
//! Ledger-side state machine for tourist identities and their append-only
//! event log:
//!
//! - **Versioned records**: one record per tourist, version bumped once per mutation
//! - **Two-layer authorization**: role gates plus record ownership
//! - **Schema validation**: every write re-validates the full record
//! - **Optimistic concurrency**: read-set/write-set conflict detection at commit
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  dispatch::invoke (positional strings)   │
//! └────────────────────┬─────────────────────┘
//!                      ▼
//! ┌──────────────────────────────────────────┐
//! │  TouristContract (authorize, validate)   │
//! └────────────────────┬─────────────────────┘
//!                      ▼
//! ┌──────────────────────────────────────────┐
//! │  TxStub (read-set, write-set, event)     │
//! └────────────────────┬─────────────────────┘
//!                      ▼
//! ┌──────────────────────────────────────────┐
//! │  LedgerStore (MemoryLedger, ...)         │
//! └──────────────────────────────────────────┘
//! ```

pub mod caller;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod memory;
pub mod query;
pub mod record;
pub mod store;
pub mod stub;
pub mod validation;

// Re-export main types
pub use caller::{AccessPolicy, CallerContext, Operation, Role};
pub use contract::{
    compute_kyc_hash, ContractConfig, HistoryEntry, RegisterTourist, TouristContract,
    TouristPage, TouristUpdate, VerificationResult,
};
pub use dispatch::invoke;
pub use error::{ContractError, ErrorKind, Result, ValidationIssue};
pub use events::ContractEvent;
pub use memory::MemoryLedger;
pub use query::RichQuery;
pub use record::{
    Destination, EmergencyContact, EventRecord, EventType, Itinerary, KnownLocation,
    TouristMetadata, TouristRecord, TouristStatus,
};
pub use store::{CommitReceipt, LedgerStore, Version};
pub use stub::TxStub;
