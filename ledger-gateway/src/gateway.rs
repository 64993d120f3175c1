//! Gateway abstraction over a ledger peer.

use async_trait::async_trait;
use chaincode::{CallerContext, CommitReceipt, ContractEvent};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where a committed transaction landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTx {
    pub tx_id: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<CommitReceipt> for ChainTx {
    fn from(r: CommitReceipt) -> Self {
        Self {
            tx_id: r.tx_id,
            block_number: r.block_number,
            timestamp: r.timestamp,
        }
    }
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    /// JSON-encoded contract return value
    pub payload: Vec<u8>,
    pub chain_tx: ChainTx,
    pub event: Option<ContractEvent>,
}

impl TxReceipt {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Event published once its transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeEvent {
    pub name: String,
    pub payload: serde_json::Value,
    pub tx_id: String,
    pub block_number: u64,
}

/// A connection to a peer that can run contract functions.
///
/// `submit` simulates, orders and commits; `evaluate` simulates only and
/// never changes ledger state.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn submit(
        &self,
        caller: &CallerContext,
        function: &str,
        args: &[String],
    ) -> Result<TxReceipt>;

    async fn evaluate(
        &self,
        caller: &CallerContext,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>>;
}
