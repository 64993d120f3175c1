//! Projection Store - low-latency reads of digital ids
//!
//! In-memory map keyed by digital id, a wallet index, and a broadcast
//! channel carrying every changed document. Writes lock one entry at a
//! time and publish after the lock is released.

use chaincode::{KnownLocation, TouristStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ledger_gateway::ChainTx;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ProjectionConfig;
use crate::error::{Result, SafetyError};
use crate::types::GeoPoint;

use super::document::DigitalIdDocument;

/// Projection store.
///
/// Architecture:
/// - DashMap of documents for reads and per-entry writes
/// - Wallet index (wallet id -> digital id)
/// - Broadcast channel for real-time updates
pub struct ProjectionStore {
    docs: DashMap<String, DigitalIdDocument>,
    wallets: DashMap<String, String>,
    update_tx: broadcast::Sender<DigitalIdDocument>,
}

impl ProjectionStore {
    pub fn new(config: &ProjectionConfig) -> Self {
        let (update_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        info!("ProjectionStore initialized (memory)");
        Self {
            docs: DashMap::new(),
            wallets: DashMap::new(),
            update_tx,
        }
    }

    /// Subscribe to document changes.
    pub fn subscribe(&self) -> broadcast::Receiver<DigitalIdDocument> {
        self.update_tx.subscribe()
    }

    fn publish(&self, doc: &DigitalIdDocument) {
        // No subscribers is fine
        let _ = self.update_tx.send(doc.clone());
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, digital_id: &str) -> Option<DigitalIdDocument> {
        self.docs.get(digital_id).map(|d| d.value().clone())
    }

    pub fn get_by_wallet(&self, wallet_id: &str) -> Option<DigitalIdDocument> {
        let digital_id = self.wallets.get(wallet_id)?.value().clone();
        self.get(&digital_id)
    }

    /// Documents whose derived status at `now` equals `status`.
    pub fn by_status(&self, status: TouristStatus, now: DateTime<Utc>) -> Vec<DigitalIdDocument> {
        let mut docs: Vec<_> = self
            .docs
            .iter()
            .filter(|d| d.derived_status(now) == status)
            .map(|d| d.value().clone())
            .collect();
        docs.sort_by(|a, b| a.digital_id.cmp(&b.digital_id));
        docs
    }

    pub fn last_known_location(&self, digital_id: &str) -> Option<KnownLocation> {
        self.docs
            .get(digital_id)
            .and_then(|d| d.last_known_location.clone())
    }

    /// Insert or replace a document.
    pub fn upsert(&self, doc: DigitalIdDocument) {
        debug!(digital_id = %doc.digital_id, "Projection upsert");
        self.wallets
            .insert(doc.wallet_id.clone(), doc.digital_id.clone());
        self.docs.insert(doc.digital_id.clone(), doc.clone());
        self.publish(&doc);
    }

    /// Apply `f` to a document under its entry lock.
    fn modify<F>(&self, digital_id: &str, f: F) -> Result<DigitalIdDocument>
    where
        F: FnOnce(&mut DigitalIdDocument),
    {
        let updated = {
            let mut entry = self
                .docs
                .get_mut(digital_id)
                .ok_or_else(|| SafetyError::NotFound(format!("Digital id {digital_id}")))?;
            f(entry.value_mut());
            entry.value().clone()
        };
        self.publish(&updated);
        Ok(updated)
    }

    /// Mirror a location fix and the reporting device.
    pub fn record_location(
        &self,
        digital_id: &str,
        point: GeoPoint,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DigitalIdDocument> {
        self.modify(digital_id, |doc| {
            doc.set_location(KnownLocation {
                lat: point.lat,
                lon: point.lon,
                timestamp: at,
            });
            if let Some(device_id) = device_id {
                doc.touch_device(device_id, at);
            }
        })
    }

    /// Apply a ledger mirror unless the document already reflects a later
    /// commit. Stale mirrors leave the document untouched and publish nothing.
    fn mirror<F>(
        &self,
        digital_id: &str,
        chain_tx: Option<ChainTx>,
        f: F,
    ) -> Result<DigitalIdDocument>
    where
        F: FnOnce(&mut DigitalIdDocument),
    {
        let updated = {
            let mut entry = self
                .docs
                .get_mut(digital_id)
                .ok_or_else(|| SafetyError::NotFound(format!("Digital id {digital_id}")))?;
            let doc = entry.value_mut();

            if let (Some(incoming), Some(current)) = (&chain_tx, &doc.chain_tx) {
                if incoming.block_number <= current.block_number {
                    debug!(
                        digital_id,
                        incoming_block = incoming.block_number,
                        current_block = current.block_number,
                        "Stale ledger mirror skipped"
                    );
                    return Ok(doc.clone());
                }
            }

            f(doc);
            if chain_tx.is_some() {
                doc.chain_tx = chain_tx;
            }
            doc.clone()
        };
        self.publish(&updated);
        Ok(updated)
    }

    /// Mirror a status change committed on the ledger.
    pub fn apply_status(
        &self,
        digital_id: &str,
        status: TouristStatus,
        reason: Option<String>,
        actor: &str,
        chain_tx: Option<ChainTx>,
        at: DateTime<Utc>,
    ) -> Result<DigitalIdDocument> {
        self.mirror(digital_id, chain_tx, |doc| {
            doc.push_status(status, reason, actor, at);
        })
    }

    /// Mirror a non-status ledger update.
    pub fn apply_update<F>(
        &self,
        digital_id: &str,
        chain_tx: ChainTx,
        f: F,
    ) -> Result<DigitalIdDocument>
    where
        F: FnOnce(&mut DigitalIdDocument),
    {
        self.mirror(digital_id, Some(chain_tx), f)
    }
}

impl Default for ProjectionStore {
    fn default() -> Self {
        Self::new(&ProjectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::document::tests::sample_document;
    use chrono::Duration;

    #[test]
    fn test_wallet_index() {
        let store = ProjectionStore::default();
        store.upsert(sample_document("t1", "wallet-9"));

        assert_eq!(store.get_by_wallet("wallet-9").unwrap().digital_id, "t1");
        assert!(store.get_by_wallet("wallet-0").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_location_missing_document() {
        let store = ProjectionStore::default();
        let err = store
            .record_location("ghost", GeoPoint::new(1.0, 2.0), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, SafetyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = ProjectionStore::default();
        store.upsert(sample_document("t1", "w1"));
        let mut rx = store.subscribe();

        store
            .record_location("t1", GeoPoint::new(26.1, 91.7), Some("phone"), Utc::now())
            .unwrap();

        let doc = rx.recv().await.unwrap();
        assert_eq!(doc.last_known_location.unwrap().lat, 26.1);
        assert_eq!(doc.devices.len(), 1);
    }

    #[test]
    fn test_by_status_uses_derived_status() {
        let store = ProjectionStore::default();
        let mut expired = sample_document("t1", "w1");
        expired.expiry_at = Utc::now() - Duration::days(1);
        store.upsert(expired);
        store.upsert(sample_document("t2", "w2"));
        store
            .apply_status(
                "t2",
                TouristStatus::Suspended,
                Some("flagged".into()),
                "officer-1",
                None,
                Utc::now(),
            )
            .unwrap();
        store.upsert(sample_document("t3", "w3"));

        let now = Utc::now();
        let ids = |s| {
            store
                .by_status(s, now)
                .into_iter()
                .map(|d| d.digital_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(TouristStatus::Expired), vec!["t1"]);
        assert_eq!(ids(TouristStatus::Suspended), vec!["t2"]);
        assert_eq!(ids(TouristStatus::Active), vec!["t3"]);

        let history = store.get("t2").unwrap().status_history;
        assert_eq!(history.last().unwrap().reason.as_deref(), Some("flagged"));
    }

    fn tx(block_number: u64) -> ChainTx {
        ChainTx {
            tx_id: format!("tx-{block_number}"),
            block_number,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_mirrors_keep_latest_commit() {
        let store = ProjectionStore::default();
        let mut doc = sample_document("t1", "w1");
        doc.chain_tx = Some(tx(1));
        store.upsert(doc);
        let mut rx = store.subscribe();

        // Revoke committed at block 6 lands before suspend from block 5
        let at = Utc::now();
        store
            .apply_status("t1", TouristStatus::Revoked, None, "desk-1", Some(tx(6)), at)
            .unwrap();
        let kept = store
            .apply_status("t1", TouristStatus::Suspended, None, "officer-1", Some(tx(5)), at)
            .unwrap();

        assert_eq!(kept.status, TouristStatus::Revoked);
        let doc = store.get("t1").unwrap();
        assert_eq!(doc.status, TouristStatus::Revoked);
        assert_eq!(doc.chain_tx.unwrap().block_number, 6);
        assert_eq!(doc.status_history.len(), 1);

        let stale = store
            .apply_update("t1", tx(4), |d| d.kyc_hash = "ff".repeat(32))
            .unwrap();
        assert_eq!(stale.kyc_hash, "ab".repeat(32));

        assert_eq!(rx.recv().await.unwrap().status, TouristStatus::Revoked);
        assert!(rx.try_recv().is_err());
    }
}
