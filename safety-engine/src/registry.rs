//! Digital-id registry
//!
//! Writes go to the ledger first; the projection mirrors what committed.
//! Sensitive payloads (full itinerary, emergency contacts) are sealed and
//! kept off-chain. The ledger carries the itinerary summary only.

use chaincode::{
    CallerContext, EmergencyContact, Itinerary, RegisterTourist, TouristRecord, TouristStatus,
    TouristUpdate, VerificationResult,
};
use chrono::{DateTime, Utc};
use ledger_gateway::{Committed, TouristLedger};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, SafetyError};
use crate::projection::{DigitalIdDocument, ProjectionStore};
use crate::sealing::Sealer;

/// Request to issue a digital id for a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDigitalId {
    pub wallet_id: String,
    pub kyc_hash: String,
    #[serde(default)]
    pub itinerary: Itinerary,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
    pub expiry_at: DateTime<Utc>,
}

/// Changes to an existing digital id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalIdUpdate {
    #[serde(default)]
    pub itinerary: Option<Itinerary>,
    #[serde(default)]
    pub emergency_contacts: Option<Vec<EmergencyContact>>,
    #[serde(default)]
    pub expiry_at: Option<DateTime<Utc>>,
}

/// Result of a registration call.
#[derive(Debug, Clone)]
pub struct Registration {
    pub document: DigitalIdDocument,
    /// False when an unexpired id already existed for the wallet
    pub created: bool,
}

pub struct DigitalIdRegistry {
    ledger: TouristLedger,
    projection: Arc<ProjectionStore>,
    sealer: Sealer,
}

impl DigitalIdRegistry {
    pub fn new(ledger: TouristLedger, projection: Arc<ProjectionStore>, sealer: Sealer) -> Self {
        Self {
            ledger,
            projection,
            sealer,
        }
    }

    pub fn ledger(&self) -> &TouristLedger {
        &self.ledger
    }

    pub fn projection(&self) -> &Arc<ProjectionStore> {
        &self.projection
    }

    /// Issue a digital id, or return the wallet's unexpired one.
    pub async fn register(
        &self,
        caller: &CallerContext,
        request: RegisterDigitalId,
    ) -> Result<Registration> {
        if request.wallet_id.trim().is_empty() {
            return Err(SafetyError::Validation("walletId is required".into()));
        }

        let now = Utc::now();
        let digital_id = match self.projection.get_by_wallet(&request.wallet_id) {
            Some(existing) if !existing.is_expired(now) => {
                info!(
                    wallet_id = %request.wallet_id,
                    digital_id = %existing.digital_id,
                    "Digital id already issued"
                );
                return Ok(Registration {
                    document: existing,
                    created: false,
                });
            }
            Some(_) => format!("{}-{}", request.wallet_id, now.timestamp()),
            None => request.wallet_id.clone(),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("walletId".to_string(), json!(request.wallet_id));

        let committed = self
            .ledger
            .register(
                caller,
                &RegisterTourist {
                    tourist_id: digital_id,
                    kyc_hash: request.kyc_hash.clone(),
                    itinerary: request.itinerary.summary(),
                    emergency_contacts: Vec::new(),
                    expiry_at: request.expiry_at.to_rfc3339(),
                    metadata,
                },
            )
            .await?;

        let document = DigitalIdDocument::from_record(
            &committed.value,
            request.wallet_id,
            self.sealer.seal(&request.itinerary)?,
            self.sealer.seal(&request.emergency_contacts)?,
            committed.chain_tx,
        );
        self.projection.upsert(document.clone());

        info!(
            digital_id = %document.digital_id,
            tx_id = %document.chain_tx.as_ref().map(|t| t.tx_id.as_str()).unwrap_or_default(),
            "Digital id issued"
        );
        Ok(Registration {
            document,
            created: true,
        })
    }

    /// Pure verification against the ledger; nothing is written.
    pub async fn verify(
        &self,
        caller: &CallerContext,
        digital_id: &str,
    ) -> Result<VerificationResult> {
        Ok(self.ledger.verify(caller, digital_id).await?)
    }

    pub async fn suspend(
        &self,
        caller: &CallerContext,
        digital_id: &str,
        reason: Option<&str>,
    ) -> Result<TouristRecord> {
        let committed = self.ledger.suspend(caller, digital_id, reason).await?;
        self.mirror_status(caller, &committed, reason);
        Ok(committed.value)
    }

    pub async fn revoke(
        &self,
        caller: &CallerContext,
        digital_id: &str,
        reason: Option<&str>,
    ) -> Result<TouristRecord> {
        let committed = self.ledger.revoke(caller, digital_id, reason).await?;
        self.mirror_status(caller, &committed, reason);
        Ok(committed.value)
    }

    pub async fn reinstate(
        &self,
        caller: &CallerContext,
        digital_id: &str,
    ) -> Result<TouristRecord> {
        let committed = self.ledger.reinstate(caller, digital_id).await?;
        self.mirror_status(caller, &committed, None);
        Ok(committed.value)
    }

    /// Update itinerary, contacts or expiry.
    ///
    /// Contacts never reach the ledger; they are resealed off-chain.
    pub async fn update(
        &self,
        caller: &CallerContext,
        digital_id: &str,
        update: DigitalIdUpdate,
    ) -> Result<TouristRecord> {
        let ledger_update = TouristUpdate {
            itinerary: update.itinerary.as_ref().map(Itinerary::summary),
            emergency_contacts: None,
            metadata: None,
            expiry_at: update.expiry_at.map(|t| t.to_rfc3339()),
        };
        if ledger_update.itinerary.is_none()
            && ledger_update.expiry_at.is_none()
            && update.emergency_contacts.is_none()
        {
            return Err(SafetyError::Validation("Nothing to update".into()));
        }

        // Seal before committing so a sealing failure writes nothing
        let sealed_itinerary = update
            .itinerary
            .as_ref()
            .map(|i| self.sealer.seal(i))
            .transpose()?;
        let sealed_contacts = update
            .emergency_contacts
            .as_ref()
            .map(|c| self.sealer.seal(c))
            .transpose()?;

        let committed = self.ledger.update(caller, digital_id, &ledger_update).await?;
        let record = committed.value.clone();

        let mirrored = self.projection.apply_update(digital_id, committed.chain_tx, |doc| {
            doc.itinerary_summary = record.itinerary.clone();
            doc.expiry_at = record.expiry_at;
            doc.updated_at = record.updated_at;
            if let Some(sealed) = sealed_itinerary {
                doc.sealed_itinerary = sealed;
            }
            if let Some(sealed) = sealed_contacts {
                doc.sealed_contacts = sealed;
            }
        });
        if let Err(e) = mirrored {
            warn!(digital_id, error = %e, "Projection update failed");
        }
        Ok(committed.value)
    }

    /// Unseal the emergency contacts of a digital id.
    pub fn emergency_contacts(&self, digital_id: &str) -> Result<Vec<EmergencyContact>> {
        let doc = self.document(digital_id)?;
        self.sealer.open(&doc.sealed_contacts)
    }

    /// Unseal the full itinerary of a digital id.
    pub fn itinerary(&self, digital_id: &str) -> Result<Itinerary> {
        let doc = self.document(digital_id)?;
        self.sealer.open(&doc.sealed_itinerary)
    }

    pub fn document(&self, digital_id: &str) -> Result<DigitalIdDocument> {
        self.projection
            .get(digital_id)
            .ok_or_else(|| SafetyError::NotFound(format!("Digital id {digital_id}")))
    }

    fn mirror_status(
        &self,
        caller: &CallerContext,
        committed: &Committed<TouristRecord>,
        reason: Option<&str>,
    ) {
        let record = &committed.value;
        let result = self.projection.apply_status(
            &record.tourist_id,
            record.status,
            reason.filter(|r| !r.is_empty()).map(str::to_string),
            &caller.identity,
            Some(committed.chain_tx.clone()),
            record.updated_at,
        );
        match result {
            Ok(_) => info!(
                digital_id = %record.tourist_id,
                status = %record.status,
                "Status mirrored"
            ),
            Err(e) => warn!(
                digital_id = %record.tourist_id,
                error = %e,
                "Projection status sync failed"
            ),
        }
    }

    /// Documents with the given derived status.
    pub fn by_status(&self, status: TouristStatus) -> Vec<DigitalIdDocument> {
        self.projection.by_status(status, Utc::now())
    }
}
