//! Alert lifecycle
//!
//! ```text
//!   open ──accept──► accepted ──resolve──► resolved
//!     └──────────────resolve──────────────────┘
//! ```
//!
//! Every transition is a compare-and-set on `status` performed while the
//! alert's map entry is locked. Exactly one caller wins `open -> accepted`;
//! the winner may repeat the call as a no-op.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SafetyError};
use crate::notify::{NotificationHub, Topic};
use crate::types::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Sos,
    Anomaly,
    Geofence,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Sos => "sos",
            AlertType::Anomaly => "anomaly",
            AlertType::Geofence => "geofence",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Accepted,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Accepted => "accepted",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An off-chain alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub alert_id: String,
    pub tourist_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub location: Option<GeoPoint>,
    pub status: AlertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_by: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Fields for a new alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub tourist_id: String,
    pub alert_type: AlertType,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
    pub device_id: Option<String>,
}

impl NewAlert {
    pub fn new(tourist_id: impl Into<String>, alert_type: AlertType) -> Self {
        Self {
            tourist_id: tourist_id.into(),
            alert_type,
            location: None,
            message: None,
            device_id: None,
        }
    }

    pub fn at(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    #[serde(default)]
    pub status: Option<AlertStatus>,
    #[serde(default, rename = "type")]
    pub alert_type: Option<AlertType>,
    #[serde(default)]
    pub tourist_id: Option<String>,
}

impl AlertFilter {
    fn matches(&self, alert: &AlertRecord) -> bool {
        self.status.map_or(true, |s| alert.status == s)
            && self.alert_type.map_or(true, |t| alert.alert_type == t)
            && self
                .tourist_id
                .as_deref()
                .map_or(true, |id| alert.tourist_id == id)
    }
}

/// Result of an accept call.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    /// This call moved the alert to accepted
    Accepted(AlertRecord),
    /// The caller had already accepted it
    AlreadyYours(AlertRecord),
}

impl AcceptOutcome {
    pub fn alert(&self) -> &AlertRecord {
        match self {
            AcceptOutcome::Accepted(a) | AcceptOutcome::AlreadyYours(a) => a,
        }
    }

    pub fn into_alert(self) -> AlertRecord {
        match self {
            AcceptOutcome::Accepted(a) | AcceptOutcome::AlreadyYours(a) => a,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, AcceptOutcome::Accepted(_))
    }
}

/// Owns every alert and publishes each change on `alert_updated`.
pub struct AlertManager {
    alerts: DashMap<String, AlertRecord>,
    hub: Arc<NotificationHub>,
}

impl AlertManager {
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self {
            alerts: DashMap::new(),
            hub,
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Create an open alert.
    pub fn open(&self, new: NewAlert) -> AlertRecord {
        let alert = AlertRecord {
            alert_id: Uuid::new_v4().to_string(),
            tourist_id: new.tourist_id,
            alert_type: new.alert_type,
            location: new.location,
            status: AlertStatus::Open,
            message: new.message,
            device_id: new.device_id,
            created_at: Utc::now(),
            accepted_by: None,
            accepted_at: None,
            resolved_by: None,
            resolved_at: None,
        };
        self.alerts.insert(alert.alert_id.clone(), alert.clone());

        info!(
            alert_id = %alert.alert_id,
            tourist_id = %alert.tourist_id,
            alert_type = %alert.alert_type,
            "Alert opened"
        );
        self.hub.publish(
            Topic::AlertUpdated,
            json!({ "event": "created", "alert": alert }),
        );
        alert
    }

    pub fn get(&self, alert_id: &str) -> Result<AlertRecord> {
        self.alerts
            .get(alert_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| SafetyError::NotFound(format!("Alert {alert_id}")))
    }

    /// Alerts matching `filter`, newest first.
    pub fn list(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
        let mut alerts: Vec<_> = self
            .alerts
            .iter()
            .filter(|a| filter.matches(a.value()))
            .map(|a| a.value().clone())
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    /// Claim an alert. Exactly one caller wins.
    pub fn accept(&self, alert_id: &str, caller_id: &str) -> Result<AcceptOutcome> {
        let outcome = {
            let mut entry = self
                .alerts
                .get_mut(alert_id)
                .ok_or_else(|| SafetyError::NotFound(format!("Alert {alert_id}")))?;
            let alert = entry.value_mut();

            match alert.status {
                AlertStatus::Open => {
                    alert.status = AlertStatus::Accepted;
                    alert.accepted_by = Some(caller_id.to_string());
                    alert.accepted_at = Some(Utc::now());
                    AcceptOutcome::Accepted(alert.clone())
                }
                AlertStatus::Accepted => match alert.accepted_by.as_deref() {
                    Some(owner) if owner == caller_id => AcceptOutcome::AlreadyYours(alert.clone()),
                    owner => {
                        debug!(alert_id, caller_id, "Accept lost to another caller");
                        return Err(SafetyError::AlreadyClaimed {
                            alert_id: alert_id.to_string(),
                            accepted_by: owner.unwrap_or_default().to_string(),
                        });
                    }
                },
                AlertStatus::Resolved => {
                    return Err(SafetyError::InvalidTransition(format!(
                        "Alert {alert_id} is already resolved"
                    )));
                }
            }
        };

        if let AcceptOutcome::Accepted(alert) = &outcome {
            info!(alert_id, accepted_by = caller_id, "Alert accepted");
            self.hub.publish(
                Topic::AlertUpdated,
                json!({
                    "event": "accepted",
                    "alertId": alert.alert_id,
                    "diff": {
                        "status": alert.status,
                        "acceptedBy": alert.accepted_by,
                        "acceptedAt": alert.accepted_at,
                    },
                    "alert": alert,
                }),
            );
        }
        Ok(outcome)
    }

    /// Close an open or accepted alert. Resolved is terminal.
    pub fn resolve(&self, alert_id: &str, caller_id: &str) -> Result<AlertRecord> {
        let resolved = {
            let mut entry = self
                .alerts
                .get_mut(alert_id)
                .ok_or_else(|| SafetyError::NotFound(format!("Alert {alert_id}")))?;
            let alert = entry.value_mut();

            if alert.status == AlertStatus::Resolved {
                return Err(SafetyError::InvalidTransition(format!(
                    "Alert {alert_id} is already resolved"
                )));
            }
            alert.status = AlertStatus::Resolved;
            alert.resolved_by = Some(caller_id.to_string());
            alert.resolved_at = Some(Utc::now());
            alert.clone()
        };

        info!(alert_id, resolved_by = caller_id, "Alert resolved");
        self.hub.publish(
            Topic::AlertUpdated,
            json!({
                "event": "resolved",
                "alertId": resolved.alert_id,
                "diff": {
                    "status": resolved.status,
                    "resolvedBy": resolved.resolved_by,
                    "resolvedAt": resolved.resolved_at,
                },
                "alert": resolved,
            }),
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaincode::ErrorKind;

    fn manager() -> (Arc<NotificationHub>, AlertManager) {
        let hub = Arc::new(NotificationHub::default());
        (hub.clone(), AlertManager::new(hub))
    }

    #[test]
    fn test_accept_once() {
        let (_, alerts) = manager();
        let alert = alerts.open(NewAlert::new("t1", AlertType::Sos).at(GeoPoint::new(1.0, 2.0)));

        let first = alerts.accept(&alert.alert_id, "officer-1").unwrap();
        assert!(first.changed());
        assert_eq!(first.alert().accepted_by.as_deref(), Some("officer-1"));

        let err = alerts.accept(&alert.alert_id, "officer-2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyClaimed);
        match err {
            SafetyError::AlreadyClaimed { accepted_by, .. } => assert_eq!(accepted_by, "officer-1"),
            other => panic!("unexpected error: {other}"),
        }

        let again = alerts.accept(&alert.alert_id, "officer-1").unwrap();
        assert!(!again.changed());
        assert_eq!(again.alert().accepted_at, first.alert().accepted_at);
    }

    #[test]
    fn test_resolve_is_terminal() {
        let (_, alerts) = manager();
        let alert = alerts.open(NewAlert::new("t1", AlertType::Anomaly));

        let resolved = alerts.resolve(&alert.alert_id, "officer-1").unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);

        let err = alerts.resolve(&alert.alert_id, "officer-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());

        let err = alerts.accept(&alert.alert_id, "officer-2").unwrap_err();
        assert!(matches!(err, SafetyError::InvalidTransition(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_alert() {
        let (_, alerts) = manager();
        assert_eq!(
            alerts.accept("missing", "officer-1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_list_filters_newest_first() {
        let (_, alerts) = manager();
        let a = alerts.open(NewAlert::new("t1", AlertType::Sos));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = alerts.open(NewAlert::new("t2", AlertType::Geofence));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let c = alerts.open(NewAlert::new("t1", AlertType::Sos));
        alerts.accept(&c.alert_id, "officer-1").unwrap();

        let all = alerts.list(&AlertFilter::default());
        let ids: Vec<_> = all.iter().map(|x| x.alert_id.as_str()).collect();
        assert_eq!(ids, vec![c.alert_id.as_str(), b.alert_id.as_str(), a.alert_id.as_str()]);

        let open_sos = alerts.list(&AlertFilter {
            status: Some(AlertStatus::Open),
            alert_type: Some(AlertType::Sos),
            tourist_id: None,
        });
        assert_eq!(open_sos.len(), 1);
        assert_eq!(open_sos[0].alert_id, a.alert_id);
    }

    #[tokio::test]
    async fn test_accept_broadcasts_diff() {
        let (hub, alerts) = manager();
        let alert = alerts.open(NewAlert::new("t1", AlertType::Sos));
        let mut rx = hub.subscribe();

        alerts.accept(&alert.alert_id, "officer-1").unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, Topic::AlertUpdated);
        assert_eq!(msg.payload["diff"]["status"], "accepted");
        assert_eq!(msg.payload["diff"]["acceptedBy"], "officer-1");

        // Idempotent re-accept publishes nothing
        alerts.accept(&alert.alert_id, "officer-1").unwrap();
        assert!(rx.try_recv().is_err());
    }
}
