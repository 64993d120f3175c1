//! Transaction simulation context.
//!
//! A [`TxStub`] is handed to every contract method. Reads go to the
//! underlying [`LedgerStore`] and are recorded in a read-set with the
//! version observed; writes are buffered in a write-set and only reach the
//! store when the stub is committed. Reads see the transaction's own
//! buffered writes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::events::ContractEvent;
use crate::store::{
    CommitReceipt, CommitRequest, KeyModification, LedgerStore, RangePage, Version, WriteOp,
};

pub struct TxStub {
    store: Arc<dyn LedgerStore>,
    tx_id: String,
    timestamp: DateTime<Utc>,
    read_set: BTreeMap<String, Option<Version>>,
    write_set: BTreeMap<String, WriteOp>,
    event: Option<ContractEvent>,
}

impl TxStub {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        tx_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            tx_id: tx_id.into(),
            timestamp,
            read_set: BTreeMap::new(),
            write_set: BTreeMap::new(),
            event: None,
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Transaction timestamp; the contract's notion of "now".
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Read a key, recording the observed version on first read.
    pub async fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(op) = self.write_set.get(key) {
            return Ok(match op {
                WriteOp::Put(v) => Some(v.clone()),
                WriteOp::Delete => None,
            });
        }

        let current = self.store.get(key).await?;
        self.read_set
            .entry(key.to_string())
            .or_insert_with(|| current.as_ref().map(|v| v.version));
        Ok(current.map(|v| v.value))
    }

    pub fn put_state(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.write_set.insert(key.into(), WriteOp::Put(value));
    }

    pub fn delete_state(&mut self, key: impl Into<String>) {
        self.write_set.insert(key.into(), WriteOp::Delete);
    }

    pub async fn get_json<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_state(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_state(key, bytes);
        Ok(())
    }

    /// Range scan over committed state. Does not see buffered writes.
    pub async fn range(
        &self,
        start: &str,
        end: &str,
        limit: usize,
        bookmark: Option<&str>,
    ) -> Result<RangePage> {
        self.store.range_query(start, end, limit, bookmark).await
    }

    pub async fn history(&self, key: &str) -> Result<Vec<KeyModification>> {
        self.store.history_for_key(key).await
    }

    /// Set the transaction's event. A later call replaces an earlier one.
    pub fn set_event(&mut self, name: impl Into<String>, payload: serde_json::Value) {
        self.event = Some(ContractEvent::new(name, payload));
    }

    pub fn event(&self) -> Option<&ContractEvent> {
        self.event.as_ref()
    }

    pub fn has_writes(&self) -> bool {
        !self.write_set.is_empty()
    }

    /// Split into the commit request and the pending event.
    pub fn into_commit(self) -> (CommitRequest, Option<ContractEvent>) {
        (
            CommitRequest {
                tx_id: self.tx_id,
                timestamp: self.timestamp,
                read_set: self.read_set,
                write_set: self.write_set,
            },
            self.event,
        )
    }

    /// Commit the write-set against the store it was simulated on.
    pub async fn commit(self) -> Result<(CommitReceipt, Option<ContractEvent>)> {
        let store = Arc::clone(&self.store);
        let (request, event) = self.into_commit();
        let receipt = store.put_with_version_check(request).await?;
        Ok((receipt, event))
    }
}

impl std::fmt::Debug for TxStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxStub")
            .field("tx_id", &self.tx_id)
            .field("timestamp", &self.timestamp)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContractError;
    use crate::memory::MemoryLedger;

    #[tokio::test]
    async fn test_read_your_writes() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let mut stub = TxStub::new(store.clone(), "tx1", Utc::now());

        assert!(stub.get_state("k").await.unwrap().is_none());
        stub.put_state("k", b"v".to_vec());
        assert_eq!(stub.get_state("k").await.unwrap().unwrap(), b"v");

        // Nothing reaches the store until commit
        assert!(store.get("k").await.unwrap().is_none());
        stub.commit().await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writers_one_wins() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let mut seed = TxStub::new(store.clone(), "seed", Utc::now());
        seed.put_state("k", b"0".to_vec());
        seed.commit().await.unwrap();

        let mut a = TxStub::new(store.clone(), "a", Utc::now());
        let mut b = TxStub::new(store.clone(), "b", Utc::now());
        a.get_state("k").await.unwrap();
        b.get_state("k").await.unwrap();
        a.put_state("k", b"a".to_vec());
        b.put_state("k", b"b".to_vec());

        assert!(a.commit().await.is_ok());
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, ContractError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_last_event_wins() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let mut stub = TxStub::new(store, "tx1", Utc::now());
        stub.set_event("First", serde_json::json!({}));
        stub.set_event("Second", serde_json::json!({}));
        assert_eq!(stub.event().unwrap().name, "Second");
    }
}
