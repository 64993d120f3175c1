//! Safety service facade.
//!
//! Wires the registry, pipeline, alert manager and notification hub over
//! one ledger gateway and exposes the operations callers use.

use chaincode::{
    CallerContext, EventRecord, EventType, MemoryLedger, TouristContract, TouristRecord,
    TouristStatus, VerificationResult,
};
use chrono::Utc;
use ledger_gateway::{
    ChainTx, Committed, EmbeddedPeer, LedgerGateway, SubmissionClient, TouristLedger,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{
    AcceptOutcome, AlertFilter, AlertManager, AlertRecord, AlertType, NewAlert,
};
use crate::config::SafetyConfig;
use crate::error::{Result, SafetyError};
use crate::notify::{Notification, NotificationHub, Topic};
use crate::oracle::{HttpScoringOracle, ScoringOracle};
use crate::pipeline::{AnomalyRecord, LocationOutcome, LocationPipeline};
use crate::projection::{DigitalIdDocument, ProjectionStore};
use crate::registry::{DigitalIdRegistry, DigitalIdUpdate, RegisterDigitalId, Registration};
use crate::sealing::Sealer;
use crate::types::{truncate_chars, GeoPoint, LocationInput};

/// SOS request from a tourist device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosRequest {
    pub tourist_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Defaults to the last known location
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub message: Option<String>,
}

/// What an SOS trigger did.
#[derive(Debug, Clone)]
pub struct SosOutcome {
    pub alert: AlertRecord,
    pub contacts_notified: usize,
    /// None when the ledger write did not commit
    pub chain_tx: Option<ChainTx>,
}

/// Tourist feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInput {
    pub tourist_id: String,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Electronic first information report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfirInput {
    pub tourist_id: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub alert_id: Option<String>,
}

pub struct SafetyService {
    config: SafetyConfig,
    identity: CallerContext,
    ledger: TouristLedger,
    hub: Arc<NotificationHub>,
    projection: Arc<ProjectionStore>,
    alerts: Arc<AlertManager>,
    registry: DigitalIdRegistry,
    pipeline: LocationPipeline,
}

impl SafetyService {
    pub fn builder(gateway: Arc<dyn LedgerGateway>) -> SafetyServiceBuilder {
        SafetyServiceBuilder::new(gateway)
    }

    /// Service over an in-process peer and memory ledger.
    pub fn embedded(config: SafetyConfig, oracle: Arc<dyn ScoringOracle>) -> Result<Self> {
        let peer = EmbeddedPeer::new(Arc::new(MemoryLedger::new()), TouristContract::default());
        SafetyServiceBuilder::new(Arc::new(peer))
            .config(config)
            .oracle(oracle)
            .build()
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn ledger(&self) -> &TouristLedger {
        &self.ledger
    }

    pub fn pipeline(&self) -> &LocationPipeline {
        &self.pipeline
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    // =========================================================================
    // Digital ids
    // =========================================================================

    pub async fn register_digital_id(
        &self,
        caller: &CallerContext,
        request: RegisterDigitalId,
    ) -> Result<Registration> {
        self.registry.register(caller, request).await
    }

    pub async fn verify(
        &self,
        caller: &CallerContext,
        digital_id: &str,
    ) -> Result<VerificationResult> {
        self.registry.verify(caller, digital_id).await
    }

    pub async fn suspend(
        &self,
        caller: &CallerContext,
        digital_id: &str,
        reason: Option<&str>,
    ) -> Result<TouristRecord> {
        self.registry.suspend(caller, digital_id, reason).await
    }

    pub async fn revoke(
        &self,
        caller: &CallerContext,
        digital_id: &str,
        reason: Option<&str>,
    ) -> Result<TouristRecord> {
        self.registry.revoke(caller, digital_id, reason).await
    }

    pub async fn reinstate(
        &self,
        caller: &CallerContext,
        digital_id: &str,
    ) -> Result<TouristRecord> {
        self.registry.reinstate(caller, digital_id).await
    }

    pub async fn update_digital_id(
        &self,
        caller: &CallerContext,
        digital_id: &str,
        update: DigitalIdUpdate,
    ) -> Result<TouristRecord> {
        self.registry.update(caller, digital_id, update).await
    }

    pub fn digital_id(&self, digital_id: &str) -> Option<DigitalIdDocument> {
        self.projection.get(digital_id)
    }

    pub fn digital_id_by_wallet(&self, wallet_id: &str) -> Option<DigitalIdDocument> {
        self.projection.get_by_wallet(wallet_id)
    }

    pub fn digital_ids_by_status(&self, status: TouristStatus) -> Vec<DigitalIdDocument> {
        self.registry.by_status(status)
    }

    pub fn last_known_location(&self, digital_id: &str) -> Option<GeoPoint> {
        self.projection
            .last_known_location(digital_id)
            .map(|l| GeoPoint::from(&l))
    }

    // =========================================================================
    // Locations
    // =========================================================================

    pub async fn update_location(&self, input: LocationInput) -> Result<LocationOutcome> {
        self.pipeline.ingest(input).await
    }

    pub fn anomalies_for(&self, tourist_id: &str) -> Vec<AnomalyRecord> {
        self.pipeline.anomalies_for(tourist_id)
    }

    // =========================================================================
    // SOS, feedback, e-FIR
    // =========================================================================

    /// Raise an SOS: alert, ledger event, contacts, authorities.
    pub async fn trigger_sos(&self, request: SosRequest) -> Result<SosOutcome> {
        let doc = self.registry.document(&request.tourist_id)?;

        if let Some(point) = &request.location {
            point.validate()?;
        }
        let location = request.location.or_else(|| {
            doc.last_known_location
                .as_ref()
                .map(GeoPoint::from)
        });
        let message = request
            .message
            .as_deref()
            .map(|m| truncate_chars(m, self.config.pipeline.summary_chars))
            .unwrap_or_else(|| "Emergency SOS triggered".to_string());

        let mut new_alert = NewAlert::new(&doc.digital_id, AlertType::Sos)
            .with_message(message.clone())
            .with_device(request.device_id.clone());
        if let Some(point) = location {
            new_alert = new_alert.at(point);
        }
        let alert = self.alerts.open(new_alert);

        let payload = json!({
            "alertId": alert.alert_id,
            "deviceId": request.device_id,
            "location": location,
            "message": message,
        });
        let chain_tx = match self
            .ledger
            .record_event(
                &self.identity,
                EventType::Sos,
                &format!("sos-{}", alert.alert_id),
                &doc.digital_id,
                &payload,
            )
            .await
        {
            Ok(committed) => Some(committed.chain_tx),
            Err(e) => {
                warn!(tourist_id = %doc.digital_id, error = %e, "RecordSOS not committed");
                None
            }
        };

        let contacts = match self.registry.emergency_contacts(&doc.digital_id) {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(tourist_id = %doc.digital_id, error = %e, "Emergency contacts unavailable");
                Vec::new()
            }
        };

        let timestamp = Utc::now();
        for contact in &contacts {
            self.hub.publish(
                Topic::EmergencyContact,
                json!({
                    "type": "SOS_ALERT",
                    "touristId": doc.digital_id,
                    "alertId": alert.alert_id,
                    "contact": contact,
                    "location": location,
                    "message": message,
                    "timestamp": timestamp,
                }),
            );
        }
        self.hub.publish(
            Topic::Authorities,
            json!({
                "type": "AUTHORITIES_ALERT",
                "touristId": doc.digital_id,
                "alertId": alert.alert_id,
                "location": location,
                "message": message,
                "timestamp": timestamp,
            }),
        );
        self.hub.publish(
            Topic::Tourist,
            json!({
                "type": "TOURIST_NOTIFICATION",
                "touristId": doc.digital_id,
                "alertId": alert.alert_id,
                "message": "SOS received, authorities have been notified",
            }),
        );

        info!(
            tourist_id = %doc.digital_id,
            alert_id = %alert.alert_id,
            contacts = contacts.len(),
            "SOS raised"
        );
        Ok(SosOutcome {
            alert,
            contacts_notified: contacts.len(),
            chain_tx,
        })
    }

    /// Append feedback to the ledger.
    pub async fn submit_feedback(&self, input: FeedbackInput) -> Result<Committed<EventRecord>> {
        if let Some(rating) = input.rating {
            if !(1..=5).contains(&rating) {
                return Err(SafetyError::Validation("rating must be between 1 and 5".into()));
            }
        }
        let mut payload = json!({});
        if let Some(rating) = input.rating {
            payload["rating"] = json!(rating);
        }
        if let Some(comment) = &input.comment {
            payload["comment"] =
                Value::String(truncate_chars(comment, self.config.pipeline.summary_chars));
        }

        let event_id = format!("feedback-{}", Uuid::new_v4());
        Ok(self
            .ledger
            .record_event(
                &self.identity,
                EventType::Feedback,
                &event_id,
                &input.tourist_id,
                &payload,
            )
            .await?)
    }

    /// File an e-FIR on the ledger and notify authorities.
    pub async fn file_efir(
        &self,
        caller: &CallerContext,
        input: EfirInput,
    ) -> Result<Committed<EventRecord>> {
        if input.description.trim().is_empty() {
            return Err(SafetyError::Validation("description is required".into()));
        }
        if let Some(point) = &input.location {
            point.validate()?;
        }

        let event_id = format!("efir-{}", Uuid::new_v4());
        let payload = json!({
            "description": truncate_chars(&input.description, self.config.pipeline.summary_chars),
            "location": input.location,
            "alertId": input.alert_id,
            "filedBy": caller.identity,
        });
        let committed = self
            .ledger
            .record_event(caller, EventType::Efir, &event_id, &input.tourist_id, &payload)
            .await?;

        self.hub.publish(
            Topic::Authorities,
            json!({
                "type": "EFIR_FILED",
                "touristId": input.tourist_id,
                "eventId": committed.value.event_id,
                "txId": committed.chain_tx.tx_id,
            }),
        );
        Ok(committed)
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    pub fn accept_alert(&self, alert_id: &str, caller_id: &str) -> Result<AcceptOutcome> {
        self.alerts.accept(alert_id, caller_id)
    }

    pub fn resolve_alert(&self, alert_id: &str, caller_id: &str) -> Result<AlertRecord> {
        self.alerts.resolve(alert_id, caller_id)
    }

    pub fn get_alert(&self, alert_id: &str) -> Result<AlertRecord> {
        self.alerts.get(alert_id)
    }

    pub fn list_alerts(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
        self.alerts.list(filter)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.hub.subscribe()
    }

    pub fn subscribe_projection(&self) -> broadcast::Receiver<DigitalIdDocument> {
        self.projection.subscribe()
    }
}

/// Builder for [`SafetyService`].
pub struct SafetyServiceBuilder {
    gateway: Arc<dyn LedgerGateway>,
    config: SafetyConfig,
    oracle: Option<Arc<dyn ScoringOracle>>,
    sealer: Option<Sealer>,
}

impl SafetyServiceBuilder {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self {
            gateway,
            config: SafetyConfig::default(),
            oracle: None,
            sealer: None,
        }
    }

    pub fn config(mut self, config: SafetyConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this oracle instead of the configured HTTP one.
    pub fn oracle(mut self, oracle: Arc<dyn ScoringOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Use this sealer instead of the configured key.
    pub fn sealer(mut self, sealer: Sealer) -> Self {
        self.sealer = Some(sealer);
        self
    }

    pub fn build(self) -> Result<SafetyService> {
        let config = self.config;

        let oracle = match self.oracle {
            Some(oracle) => oracle,
            None => Arc::new(HttpScoringOracle::new(&config.oracle)?),
        };
        let sealer = match self.sealer {
            Some(sealer) => sealer,
            None => Sealer::from_config(config.projection.sealing_key.as_deref())?,
        };

        let client = SubmissionClient::with_policy(self.gateway, config.retry.clone());
        let ledger = TouristLedger::new(client);
        let identity = config.ledger.caller();

        let hub = Arc::new(NotificationHub::new(&config.notifications));
        let projection = Arc::new(ProjectionStore::new(&config.projection));
        let alerts = Arc::new(AlertManager::new(hub.clone()));

        let registry = DigitalIdRegistry::new(ledger.clone(), projection.clone(), sealer);
        let pipeline = LocationPipeline::new(
            config.pipeline.clone(),
            projection.clone(),
            oracle,
            ledger.clone(),
            identity.clone(),
            alerts.clone(),
            hub.clone(),
        );

        info!(
            identity = %identity.identity,
            window = config.pipeline.window_size,
            threshold = config.pipeline.anomaly_threshold,
            "SafetyService initialized"
        );

        Ok(SafetyService {
            config,
            identity,
            ledger,
            hub,
            projection,
            alerts,
            registry,
            pipeline,
        })
    }
}
