//! Core trait for scoring oracles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafetyError};
use crate::types::LocationSample;

/// Scores location windows and evaluates geofences.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Score a window of samples, oldest first.
    async fn score(&self, request: &ScoringRequest) -> Result<AnomalyScore>;

    /// Geofence actions for a single point.
    async fn check_geofence(&self, ping: &GeofencePing) -> Result<Vec<GeofenceAction>>;
}

/// Request body for anomaly scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// RFC 3339 timestamps
    pub timestamps: Vec<String>,
}

impl ScoringRequest {
    pub fn from_samples(samples: &[LocationSample]) -> Self {
        Self {
            latitudes: samples.iter().map(|s| s.lat).collect(),
            longitudes: samples.iter().map(|s| s.lon).collect(),
            timestamps: samples.iter().map(|s| s.ts.to_rfc3339()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.latitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latitudes.is_empty()
    }
}

/// Scoring result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub anomaly_score: f64,
    pub sequence_length: usize,
    /// Oracle's own verdict; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<bool>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl AnomalyScore {
    pub fn new(anomaly_score: f64, sequence_length: usize) -> Self {
        Self {
            anomaly_score,
            sequence_length,
            is_anomaly: None,
            anomaly_type: None,
            explanation: None,
        }
    }

    /// Reject scores outside `[0, 1]`; the oracle is treated as faulty.
    pub fn validated(self) -> Result<Self> {
        if self.anomaly_score.is_finite() && (0.0..=1.0).contains(&self.anomaly_score) {
            Ok(self)
        } else {
            Err(SafetyError::UpstreamUnavailable(format!(
                "Oracle returned out-of-range score {}",
                self.anomaly_score
            )))
        }
    }

    /// Inclusive threshold check.
    pub fn crosses(&self, threshold: f64) -> bool {
        self.anomaly_score >= threshold
    }
}

/// Request body for a geofence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofencePing {
    pub tourist_id: String,
    pub lat: f64,
    pub lon: f64,
}

/// One action returned by a geofence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceAction {
    #[serde(default)]
    pub geofence: Option<String>,
    #[serde(default, rename = "type")]
    pub action_type: Option<String>,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl GeofenceAction {
    /// Restricted zone entry, or an explicit `alert` action.
    pub fn is_alert(&self) -> bool {
        self.restricted || self.action_type.as_deref() == Some("alert")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(AnomalyScore::new(0.65, 21).crosses(0.65));
        assert!(!AnomalyScore::new(0.6499, 21).crosses(0.65));
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        assert!(AnomalyScore::new(1.0, 21).validated().is_ok());
        assert!(AnomalyScore::new(0.0, 21).validated().is_ok());
        for bad in [1.5, -0.1, f64::NAN, f64::INFINITY] {
            let err = AnomalyScore::new(bad, 21).validated().unwrap_err();
            assert!(matches!(err, SafetyError::UpstreamUnavailable(_)));
        }
    }

    #[test]
    fn test_oracle_response_parses() {
        let score: AnomalyScore = serde_json::from_str(
            r#"{"success": true, "sequence_length": 21, "anomaly_score": 0.91}"#,
        )
        .unwrap();
        assert_eq!(score.sequence_length, 21);
        assert!(score.is_anomaly.is_none());
    }

    #[test]
    fn test_geofence_alert_kinds() {
        let restricted: GeofenceAction =
            serde_json::from_str(r#"{"geofence": "Border Zone", "restricted": true}"#).unwrap();
        let explicit: GeofenceAction = serde_json::from_str(r#"{"type": "alert"}"#).unwrap();
        let info: GeofenceAction =
            serde_json::from_str(r#"{"geofence": "Market", "restricted": false}"#).unwrap();

        assert!(restricted.is_alert());
        assert!(explicit.is_alert());
        assert!(!info.is_alert());
    }
}
