//! Ledger Gateway
//!
//! Connects off-chain services to the tourist identity contract:
//!
//! - **LedgerGateway**: submit/evaluate seam over a peer
//! - **EmbeddedPeer**: in-process peer over any `LedgerStore`
//! - **SubmissionClient**: retry-on-conflict with linear backoff
//! - **TouristLedger**: typed calls instead of positional strings
//! - **FlakyGateway**: conflict and outage injection for tests

pub mod client;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod peer;
pub mod retry;
pub mod testing;

// Re-export main types
pub use client::{submit_with_retry, SubmissionClient};
pub use error::{GatewayError, Result};
pub use gateway::{ChainTx, ChaincodeEvent, LedgerGateway, TxReceipt};
pub use ledger::{Committed, TouristLedger};
pub use peer::EmbeddedPeer;
pub use retry::RetryPolicy;
pub use testing::FlakyGateway;
