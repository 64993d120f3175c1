//! Scoring oracle abstraction.
//!
//! - HTTP client for the ML service
//! - Mock oracle for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpScoringOracle;
pub use mock::MockOracle;
pub use traits::{AnomalyScore, GeofenceAction, GeofencePing, ScoringOracle, ScoringRequest};
