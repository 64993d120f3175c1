//! Projected digital-id document.
//!
//! Denormalized mirror of a ledger tourist record, plus off-chain-only
//! fields (devices, sealed payloads, status history).

use chaincode::{Itinerary, KnownLocation, TouristRecord, TouristStatus};
use chrono::{DateTime, Utc};
use ledger_gateway::ChainTx;
use serde::{Deserialize, Serialize};

use crate::sealing::SealedBox;

/// A device that has reported locations for a tourist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// One status change as observed by the projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: TouristStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// Off-chain projection of one digital id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalIdDocument {
    /// Same as the ledger `touristId`
    pub digital_id: String,
    pub wallet_id: String,
    pub kyc_hash: String,
    /// Destinations and dates only; safe to show
    pub itinerary_summary: Itinerary,
    pub sealed_itinerary: SealedBox,
    pub sealed_contacts: SealedBox,
    /// Last status mirrored from the ledger
    pub status: TouristStatus,
    pub issuer: String,
    pub issuer_id: String,
    pub expiry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_location: Option<KnownLocation>,
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    /// Last successful ledger write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_tx: Option<ChainTx>,
}

impl DigitalIdDocument {
    /// Build from a freshly committed ledger record.
    pub fn from_record(
        record: &TouristRecord,
        wallet_id: impl Into<String>,
        sealed_itinerary: SealedBox,
        sealed_contacts: SealedBox,
        chain_tx: ChainTx,
    ) -> Self {
        Self {
            digital_id: record.tourist_id.clone(),
            wallet_id: wallet_id.into(),
            kyc_hash: record.kyc_hash.clone(),
            itinerary_summary: record.itinerary.summary(),
            sealed_itinerary,
            sealed_contacts,
            status: record.status,
            issuer: record.issuer.clone(),
            issuer_id: record.issuer_id.clone(),
            expiry_at: record.expiry_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_known_location: record.metadata.last_known_location.clone(),
            devices: Vec::new(),
            status_history: vec![StatusChange {
                status: record.status,
                reason: None,
                actor: record.issuer_id.clone(),
                at: record.created_at,
            }],
            chain_tx: Some(chain_tx),
        }
    }

    /// Status as seen at `now`, using the same rule as the ledger.
    pub fn derived_status(&self, now: DateTime<Utc>) -> TouristStatus {
        match self.status {
            TouristStatus::Revoked => TouristStatus::Revoked,
            TouristStatus::Suspended => TouristStatus::Suspended,
            _ if now > self.expiry_at => TouristStatus::Expired,
            _ => TouristStatus::Active,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_at
    }

    /// Add the device or refresh its `lastActive`.
    pub fn touch_device(&mut self, device_id: &str, now: DateTime<Utc>) {
        match self.devices.iter_mut().find(|d| d.device_id == device_id) {
            Some(device) => {
                if now > device.last_active {
                    device.last_active = now;
                }
            }
            None => self.devices.push(DeviceRecord {
                device_id: device_id.to_string(),
                registered_at: now,
                last_active: now,
            }),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub(crate) fn set_location(&mut self, location: KnownLocation) {
        let at = location.timestamp;
        self.last_known_location = Some(location);
        self.touch(at);
    }

    pub(crate) fn push_status(
        &mut self,
        status: TouristStatus,
        reason: Option<String>,
        actor: &str,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history.push(StatusChange {
            status,
            reason,
            actor: actor.to_string(),
            at,
        });
        self.touch(at);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_document(digital_id: &str, wallet_id: &str) -> DigitalIdDocument {
        let now = Utc::now();
        let sealed = SealedBox {
            nonce: "00".repeat(12),
            data: String::new(),
        };
        DigitalIdDocument {
            digital_id: digital_id.to_string(),
            wallet_id: wallet_id.to_string(),
            kyc_hash: "ab".repeat(32),
            itinerary_summary: Itinerary::default(),
            sealed_itinerary: sealed.clone(),
            sealed_contacts: sealed,
            status: TouristStatus::Active,
            issuer: "Org1MSP".to_string(),
            issuer_id: "desk-1".to_string(),
            expiry_at: now + Duration::days(30),
            created_at: now,
            updated_at: now,
            last_known_location: None,
            devices: Vec::new(),
            status_history: Vec::new(),
            chain_tx: None,
        }
    }

    #[test]
    fn test_devices_are_deduplicated() {
        let mut doc = sample_document("t1", "w1");
        let t0 = Utc::now();
        doc.touch_device("phone", t0);
        doc.touch_device("band", t0);
        doc.touch_device("phone", t0 + Duration::seconds(5));

        assert_eq!(doc.devices.len(), 2);
        let phone = &doc.devices[0];
        assert_eq!(phone.registered_at, t0);
        assert_eq!(phone.last_active, t0 + Duration::seconds(5));
    }

    #[test]
    fn test_derived_status_follows_expiry() {
        let mut doc = sample_document("t1", "w1");
        let later = doc.expiry_at + Duration::seconds(1);
        assert_eq!(doc.derived_status(Utc::now()), TouristStatus::Active);
        assert_eq!(doc.derived_status(later), TouristStatus::Expired);

        doc.status = TouristStatus::Suspended;
        assert_eq!(doc.derived_status(later), TouristStatus::Suspended);
    }
}
