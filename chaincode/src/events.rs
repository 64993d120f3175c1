//! Ledger-native events emitted by contract transactions.

use serde::{Deserialize, Serialize};

pub const TOURIST_REGISTERED: &str = "TouristRegistered";
pub const TOURIST_UPDATED: &str = "TouristUpdated";
pub const TOURIST_SUSPENDED: &str = "TouristSuspended";
pub const TOURIST_REVOKED: &str = "TouristRevoked";
pub const TOURIST_REINSTATED: &str = "TouristReinstated";
pub const TOURIST_VERIFIED: &str = "TouristVerified";

/// Event set by a transaction and published once it commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

impl ContractEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}
