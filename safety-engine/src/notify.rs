//! Notification fan-out
//!
//! Publishes `{topic, payload}` messages to every connected subscriber.
//!
//! ```text
//! AlertManager / Pipeline / SOS
//!     │
//!     └─► NotificationHub (broadcast)
//!              │
//!              └─► subscribers (dashboards, contact relays, devices)
//! ```
//!
//! Publishing never waits on subscribers. A subscriber that falls more than
//! `channel_capacity` messages behind sees `RecvError::Lagged` and skips ahead.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::config::NotificationConfig;

/// Fan-out topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Alert created or changed
    AlertUpdated,
    /// Message for a tourist's emergency contact
    EmergencyContact,
    /// Message for police / control room
    Authorities,
    /// Message for the tourist's own devices
    Tourist,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::AlertUpdated => "alert_updated",
            Topic::EmergencyContact => "emergency_contact",
            Topic::Authorities => "authorities",
            Topic::Tourist => "tourist",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: Topic,
    pub payload: Value,
}

impl Notification {
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self { topic, payload }
    }
}

/// Publish/subscribe hub.
#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(config: &NotificationConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a message. Returns the number of subscribers it reached.
    pub fn publish(&self, topic: Topic, payload: Value) -> usize {
        match self.tx.send(Notification::new(topic, payload)) {
            Ok(n) => {
                debug!(topic = %topic, subscribers = n, "Notification published");
                n
            }
            Err(_) => {
                trace!(topic = %topic, "No subscribers, notification dropped");
                0
            }
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(&NotificationConfig::default())
    }
}
