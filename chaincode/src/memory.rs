//! Embedded in-memory ledger.
//!
//! Keeps current state and full per-key history in a `BTreeMap` so range
//! scans come back in key order. Commits are serialized behind a single
//! write lock, which gives one global commit order.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ContractError, Result};
use crate::store::{
    CommitReceipt, CommitRequest, KeyModification, LedgerStore, RangePage, VersionedValue, WriteOp,
};

#[derive(Debug, Default)]
struct KeyEntry {
    current: Option<VersionedValue>,
    history: Vec<KeyModification>,
}

#[derive(Debug, Default)]
struct LedgerState {
    keys: BTreeMap<String, KeyEntry>,
    height: u64,
}

/// In-memory [`LedgerStore`] for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed transactions.
    pub async fn height(&self) -> u64 {
        self.state.read().await.height
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        self.state
            .read()
            .await
            .keys
            .values()
            .filter(|e| e.current.is_some())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>> {
        let state = self.state.read().await;
        Ok(state.keys.get(key).and_then(|e| e.current.clone()))
    }

    async fn put_with_version_check(&self, request: CommitRequest) -> Result<CommitReceipt> {
        let mut state = self.state.write().await;

        for (key, observed) in &request.read_set {
            let current = state
                .keys
                .get(key)
                .and_then(|e| e.current.as_ref())
                .map(|v| v.version);
            if current != *observed {
                debug!(
                    tx_id = %request.tx_id,
                    key = %key,
                    observed = ?observed,
                    current = ?current,
                    "Rejecting stale read-set"
                );
                return Err(ContractError::Conflict { key: key.clone() });
            }
        }

        state.height += 1;
        let block_number = state.height;

        for (key, op) in request.write_set {
            let entry = state.keys.entry(key).or_default();
            match op {
                WriteOp::Put(value) => {
                    entry.history.push(KeyModification {
                        tx_id: request.tx_id.clone(),
                        timestamp: request.timestamp,
                        is_delete: false,
                        value: Some(value.clone()),
                        version: block_number,
                    });
                    entry.current = Some(VersionedValue {
                        value,
                        version: block_number,
                        tx_id: request.tx_id.clone(),
                    });
                }
                WriteOp::Delete => {
                    entry.history.push(KeyModification {
                        tx_id: request.tx_id.clone(),
                        timestamp: request.timestamp,
                        is_delete: true,
                        value: None,
                        version: block_number,
                    });
                    entry.current = None;
                }
            }
        }

        Ok(CommitReceipt {
            tx_id: request.tx_id,
            block_number,
            timestamp: request.timestamp,
        })
    }

    async fn range_query(
        &self,
        start: &str,
        end: &str,
        limit: usize,
        bookmark: Option<&str>,
    ) -> Result<RangePage> {
        let state = self.state.read().await;

        let lower = match bookmark {
            Some(b) if !b.is_empty() && b >= start => Bound::Excluded(b.to_string()),
            _ => Bound::Included(start.to_string()),
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_string())
        };

        let mut live = state
            .keys
            .range((lower, upper))
            .filter_map(|(k, e)| e.current.as_ref().map(|v| (k.clone(), v.clone())));

        let entries: Vec<_> = live.by_ref().take(limit).collect();
        let bookmark = if live.next().is_some() {
            entries.last().map(|(k, _)| k.clone())
        } else {
            None
        };

        Ok(RangePage { entries, bookmark })
    }

    async fn history_for_key(&self, key: &str) -> Result<Vec<KeyModification>> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(key)
            .map(|e| e.history.clone())
            .unwrap_or_default())
    }
}
