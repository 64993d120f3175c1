//! Location/anomaly pipeline
//!
//! One call per incoming fix:
//!
//! ```text
//! validate ─► persist ─► projection ─► snapshot(21)
//!                                         │
//!                     geofence(latest) ◄──┤ always
//!                     score(window)    ◄──┘ once 21 samples exist
//!                         │
//!                         └─ score >= 0.65 ─► AnomalyRecord
//!                                            RecordAnomaly (last 5 points)
//!                                            authorities + anomaly alert
//! ```
//!
//! Oracle and ledger failures degrade the cycle; they never fail ingestion
//! once the sample is persisted.

use chaincode::{CallerContext, EventType};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ledger_gateway::{ChainTx, TouristLedger};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{AlertManager, AlertRecord, AlertType, NewAlert};
use crate::config::PipelineConfig;
use crate::error::{Result, SafetyError};
use crate::locations::LocationLog;
use crate::notify::{NotificationHub, Topic};
use crate::oracle::{AnomalyScore, GeofenceAction, GeofencePing, ScoringOracle, ScoringRequest};
use crate::projection::ProjectionStore;
use crate::types::{truncate_chars, LocationInput, LocationSample};

/// A point in an anomaly window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub lat: f64,
    pub lon: f64,
    pub ts: DateTime<Utc>,
}

impl From<&LocationSample> for TrailPoint {
    fn from(s: &LocationSample) -> Self {
        Self {
            lat: s.lat,
            lon: s.lon,
            ts: s.ts,
        }
    }
}

/// An anomaly kept off-chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub anomaly_id: String,
    pub tourist_id: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub explanation: String,
    /// Full scoring window, oldest first
    pub window: Vec<TrailPoint>,
    pub created_at: DateTime<Utc>,
    /// Set once `RecordAnomaly` commits
    pub ledger_event_id: Option<String>,
    pub chain_tx: Option<ChainTx>,
}

/// Which optional steps were skipped this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Degraded {
    pub geofence: bool,
    pub scoring: bool,
    pub ledger: bool,
    pub projection: bool,
}

impl Degraded {
    pub fn any(&self) -> bool {
        self.geofence || self.scoring || self.ledger || self.projection
    }
}

/// What one ingestion did.
#[derive(Debug, Clone)]
pub struct LocationOutcome {
    pub sample: LocationSample,
    /// Samples in the snapshot used for scoring
    pub window_len: usize,
    pub score: Option<AnomalyScore>,
    pub anomaly: Option<AnomalyRecord>,
    pub geofence_actions: Vec<GeofenceAction>,
    pub alerts: Vec<AlertRecord>,
    pub degraded: Degraded,
}

pub struct LocationPipeline {
    config: PipelineConfig,
    log: LocationLog,
    anomalies: DashMap<String, Vec<AnomalyRecord>>,
    projection: Arc<ProjectionStore>,
    oracle: Arc<dyn ScoringOracle>,
    ledger: TouristLedger,
    identity: CallerContext,
    alerts: Arc<AlertManager>,
    hub: Arc<NotificationHub>,
}

impl LocationPipeline {
    pub fn new(
        config: PipelineConfig,
        projection: Arc<ProjectionStore>,
        oracle: Arc<dyn ScoringOracle>,
        ledger: TouristLedger,
        identity: CallerContext,
        alerts: Arc<AlertManager>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            log: LocationLog::new(config.max_retained_samples.max(config.window_size)),
            config,
            anomalies: DashMap::new(),
            projection,
            oracle,
            ledger,
            identity,
            alerts,
            hub,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn locations(&self) -> &LocationLog {
        &self.log
    }

    /// Anomalies recorded for a tourist, oldest first.
    pub fn anomalies_for(&self, tourist_id: &str) -> Vec<AnomalyRecord> {
        self.anomalies
            .get(tourist_id)
            .map(|a| a.value().clone())
            .unwrap_or_default()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().map(|a| a.value().len()).sum()
    }

    fn validate(&self, input: &LocationInput) -> Result<()> {
        if input.tourist_id.trim().is_empty() {
            return Err(SafetyError::Validation("touristId is required".into()));
        }
        input.point().validate()?;
        if input.speed.is_some_and(|s| !s.is_finite() || s < 0.0) {
            return Err(SafetyError::Validation("speed must be a non-negative number".into()));
        }
        if input.accuracy.is_some_and(|a| !a.is_finite() || a < 0.0) {
            return Err(SafetyError::Validation(
                "accuracy must be a non-negative number".into(),
            ));
        }
        if self.projection.get(&input.tourist_id).is_none() {
            return Err(SafetyError::NotFound(format!(
                "Digital id {}",
                input.tourist_id
            )));
        }
        Ok(())
    }

    /// Ingest one location fix.
    pub async fn ingest(&self, input: LocationInput) -> Result<LocationOutcome> {
        self.validate(&input)?;

        let sample = self.log.append(&input);
        let tourist_id = sample.tourist_id.clone();
        debug!(tourist_id = %tourist_id, seq = sample.seq, "Location persisted");

        let mut degraded = Degraded::default();

        if let Err(e) = self.projection.record_location(
            &tourist_id,
            sample.point(),
            sample.device_id.as_deref(),
            sample.persisted_at,
        ) {
            warn!(tourist_id = %tourist_id, error = %e, "Projection location update failed");
            degraded.projection = true;
        }

        let window = self.log.recent(&tourist_id, self.config.window_size);

        let mut alerts = Vec::new();
        let geofence_actions = match self.check_geofence(&sample).await {
            Ok(actions) => {
                for action in actions.iter().filter(|a| a.is_alert()) {
                    alerts.push(self.geofence_alert(&sample, action));
                }
                actions
            }
            Err(e) => {
                warn!(tourist_id = %tourist_id, error = %e, "Geofence check skipped");
                degraded.geofence = true;
                Vec::new()
            }
        };

        let mut score = None;
        let mut anomaly = None;
        if window.len() >= self.config.window_size {
            let scored = self
                .oracle
                .score(&ScoringRequest::from_samples(&window))
                .await
                .and_then(AnomalyScore::validated);
            match scored {
                Ok(result) => {
                    debug!(
                        tourist_id = %tourist_id,
                        score = result.anomaly_score,
                        "Window scored"
                    );
                    if result.crosses(self.config.anomaly_threshold) {
                        let (record, alert, ledger_ok) =
                            self.raise_anomaly(&tourist_id, &result, &window).await;
                        degraded.ledger |= !ledger_ok;
                        alerts.push(alert);
                        anomaly = Some(record);
                    }
                    score = Some(result);
                }
                Err(e) => {
                    warn!(tourist_id = %tourist_id, error = %e, "Anomaly scoring skipped");
                    degraded.scoring = true;
                }
            }
        }

        Ok(LocationOutcome {
            sample,
            window_len: window.len(),
            score,
            anomaly,
            geofence_actions,
            alerts,
            degraded,
        })
    }

    async fn check_geofence(&self, sample: &LocationSample) -> Result<Vec<GeofenceAction>> {
        self.oracle
            .check_geofence(&GeofencePing {
                tourist_id: sample.tourist_id.clone(),
                lat: sample.lat,
                lon: sample.lon,
            })
            .await
    }

    fn geofence_alert(&self, sample: &LocationSample, action: &GeofenceAction) -> AlertRecord {
        let zone = action.geofence.clone().unwrap_or_else(|| "unknown".to_string());
        let alert = self.alerts.open(
            NewAlert::new(&sample.tourist_id, AlertType::Geofence)
                .at(sample.point())
                .with_message(
                    action
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("Entered geofence {zone}")),
                )
                .with_device(sample.device_id.clone()),
        );
        let payload = json!({
            "type": "GEOFENCE_ALERT",
            "touristId": sample.tourist_id,
            "alertId": alert.alert_id,
            "geofence": zone,
            "restricted": action.restricted,
            "location": sample.point(),
        });
        self.hub.publish(Topic::Authorities, payload.clone());
        self.hub.publish(Topic::Tourist, payload);
        alert
    }

    /// Off-chain record, ledger event, authorities notice, alert.
    async fn raise_anomaly(
        &self,
        tourist_id: &str,
        result: &AnomalyScore,
        window: &[LocationSample],
    ) -> (AnomalyRecord, AlertRecord, bool) {
        let anomaly_id = Uuid::new_v4().to_string();
        let anomaly_type = result
            .anomaly_type
            .clone()
            .unwrap_or_else(|| "route_deviation".to_string());
        let explanation = truncate_chars(
            result
                .explanation
                .as_deref()
                .unwrap_or("Movement pattern deviates from expected behaviour"),
            self.config.summary_chars,
        );

        let mut record = AnomalyRecord {
            anomaly_id: anomaly_id.clone(),
            tourist_id: tourist_id.to_string(),
            score: result.anomaly_score,
            anomaly_type,
            explanation,
            window: window.iter().map(TrailPoint::from).collect(),
            created_at: Utc::now(),
            ledger_event_id: None,
            chain_tx: None,
        };

        let trail_start = window.len().saturating_sub(self.config.ledger_trail);
        let trail: Vec<TrailPoint> = window[trail_start..].iter().map(TrailPoint::from).collect();
        let event_id = format!("anomaly-{anomaly_id}");
        let payload = json!({
            "anomalyId": anomaly_id,
            "score": record.score,
            "type": record.anomaly_type,
            "explanation": record.explanation,
            "trail": trail,
        });

        let ledger_ok = match self
            .ledger
            .record_event(&self.identity, EventType::Anomaly, &event_id, tourist_id, &payload)
            .await
        {
            Ok(committed) => {
                record.ledger_event_id = Some(committed.value.event_id);
                record.chain_tx = Some(committed.chain_tx);
                true
            }
            Err(e) => {
                warn!(tourist_id, error = %e, "RecordAnomaly not committed");
                false
            }
        };

        self.anomalies
            .entry(tourist_id.to_string())
            .or_default()
            .push(record.clone());

        let location = window.last().map(LocationSample::point);
        let mut new_alert = NewAlert::new(tourist_id, AlertType::Anomaly)
            .with_message(record.explanation.clone());
        if let Some(point) = location {
            new_alert = new_alert.at(point);
        }
        let alert = self.alerts.open(new_alert);

        self.hub.publish(
            Topic::Authorities,
            json!({
                "type": "ANOMALY_DETECTED",
                "touristId": tourist_id,
                "anomalyId": record.anomaly_id,
                "alertId": alert.alert_id,
                "location": location,
                "score": record.score,
            }),
        );

        info!(
            tourist_id,
            anomaly_id = %record.anomaly_id,
            score = record.score,
            "Anomaly detected"
        );
        (record, alert, ledger_ok)
    }
}
