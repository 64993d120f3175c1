//! Ledger record store abstraction.
//!
//! The contract runs against any ordered, versioned key-value store that
//! can detect optimistic-concurrency conflicts at commit time. An embedded
//! in-memory implementation lives in [`crate::memory`]; a production
//! implementation wraps a distributed ledger client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::Result;

/// Commit sequence number of the transaction that last wrote a key.
pub type Version = u64;

/// Current value of a key together with the version that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: Vec<u8>,
    pub version: Version,
    pub tx_id: String,
}

/// One committed write in a key's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: Option<Vec<u8>>,
    pub version: Version,
}

/// A page of a range scan.
#[derive(Debug, Clone, Default)]
pub struct RangePage {
    pub entries: Vec<(String, VersionedValue)>,
    /// Resume token: the last key returned, present only if more keys remain
    pub bookmark: Option<String>,
}

/// Buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>),
    Delete,
}

/// Read-set and write-set of a simulated transaction.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// Version observed for each key read (`None` = key was absent)
    pub read_set: BTreeMap<String, Option<Version>>,
    pub write_set: BTreeMap<String, WriteOp>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub tx_id: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

/// Ordered, versioned key-value ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the current value of a key.
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>>;

    /// Atomically apply the write-set if every key in the read-set still
    /// carries the observed version. Fails with `ContractError::Conflict`
    /// naming the first stale key otherwise.
    async fn put_with_version_check(&self, request: CommitRequest) -> Result<CommitReceipt>;

    /// Scan live keys in `[start, end)` in key order, resuming after
    /// `bookmark` when given. An empty `end` means unbounded.
    async fn range_query(
        &self,
        start: &str,
        end: &str,
        limit: usize,
        bookmark: Option<&str>,
    ) -> Result<RangePage>;

    /// Every committed write of a key, oldest first.
    async fn history_for_key(&self, key: &str) -> Result<Vec<KeyModification>>;
}

/// Exclusive upper bound covering every key that starts with `prefix`.
pub fn prefix_end(prefix: &str) -> String {
    format!("{prefix}\u{10FFFF}")
}
