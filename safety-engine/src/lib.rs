//! Safety Engine
//!
//! Off-chain side of the tourist safety ledger:
//!
//! - **Registry**: issues digital ids on the ledger, seals sensitive payloads
//! - **Projection**: eventually-consistent mirror for fast reads
//! - **Pipeline**: location ingestion, geofence checks, anomaly scoring
//! - **Alerts**: accept-once lifecycle over a compare-and-set
//! - **Notifications**: fire-and-forget `{topic, payload}` fan-out
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      SafetyService                        │
//! └──────┬──────────────┬──────────────┬──────────────┬───────┘
//!        ▼              ▼              ▼              ▼
//!  DigitalIdRegistry  LocationPipeline  AlertManager  NotificationHub
//!        │              │   │              │              ▲
//!        │              │   └─► ScoringOracle             │
//!        ▼              ▼                  └──────────────┘
//!  ┌──────────────────────────┐   ┌──────────────────┐
//!  │ TouristLedger (retrying) │   │ ProjectionStore  │
//!  └──────────────────────────┘   └──────────────────┘
//! ```

pub mod alerts;
pub mod config;
pub mod error;
pub mod locations;
pub mod notify;
pub mod oracle;
pub mod pipeline;
pub mod projection;
pub mod registry;
pub mod sealing;
pub mod service;
pub mod types;

// Re-export main types
pub use alerts::{
    AcceptOutcome, AlertFilter, AlertManager, AlertRecord, AlertStatus, AlertType, NewAlert,
};
pub use config::{
    LedgerIdentityConfig, NotificationConfig, OracleConfig, PipelineConfig, ProjectionConfig,
    SafetyConfig,
};
pub use error::{Result, SafetyError};
pub use locations::LocationLog;
pub use notify::{Notification, NotificationHub, Topic};
pub use oracle::{
    AnomalyScore, GeofenceAction, GeofencePing, HttpScoringOracle, MockOracle, ScoringOracle,
    ScoringRequest,
};
pub use pipeline::{AnomalyRecord, Degraded, LocationOutcome, LocationPipeline, TrailPoint};
pub use projection::{DeviceRecord, DigitalIdDocument, ProjectionStore, StatusChange};
pub use registry::{DigitalIdRegistry, DigitalIdUpdate, RegisterDigitalId, Registration};
pub use sealing::{SealedBox, Sealer};
pub use service::{
    EfirInput, FeedbackInput, SafetyService, SafetyServiceBuilder, SosOutcome, SosRequest,
};
pub use types::{GeoPoint, LocationInput, LocationSample};
