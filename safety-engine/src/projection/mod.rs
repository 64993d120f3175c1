//! Off-chain projection of ledger identities.
//!
//! Eventually consistent with the ledger. Used for fast reads and for
//! sealed data the ledger never holds; never for authorization.

pub mod document;
pub mod store;

pub use document::{DeviceRecord, DigitalIdDocument, StatusChange};
pub use store::ProjectionStore;
