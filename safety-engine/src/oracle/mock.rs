//! Mock scoring oracle for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::traits::*;
use crate::error::{Result, SafetyError};

/// Mock oracle.
///
/// Scores are taken from a script first, then the default score.
pub struct MockOracle {
    default_score: f64,
    scripted: Mutex<VecDeque<f64>>,
    geofence_actions: Mutex<Vec<GeofenceAction>>,
    available: AtomicBool,
    geofence_available: AtomicBool,
    call_count: AtomicU32,
    geofence_calls: AtomicU32,
    last_request: Mutex<Option<ScoringRequest>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            default_score: 0.1,
            scripted: Mutex::new(VecDeque::new()),
            geofence_actions: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            geofence_available: AtomicBool::new(true),
            call_count: AtomicU32::new(0),
            geofence_calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Score returned once the script runs out.
    pub fn with_score(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    /// Scores returned in order before the default applies.
    pub fn with_script(self, scores: impl IntoIterator<Item = f64>) -> Self {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.extend(scores);
        }
        self
    }

    pub fn with_geofence_actions(self, actions: Vec<GeofenceAction>) -> Self {
        self.set_geofence_actions(actions);
        self
    }

    pub fn with_available(self, available: bool) -> Self {
        self.set_available(available);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_geofence_available(&self, available: bool) {
        self.geofence_available.store(available, Ordering::SeqCst);
    }

    pub fn set_geofence_actions(&self, actions: Vec<GeofenceAction>) {
        if let Ok(mut current) = self.geofence_actions.lock() {
            *current = actions;
        }
    }

    /// Number of `score` calls.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn geofence_calls(&self) -> u32 {
        self.geofence_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ScoringRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScoringOracle for MockOracle {
    async fn score(&self, request: &ScoringRequest) -> Result<AnomalyScore> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(SafetyError::UpstreamUnavailable(
                "Mock oracle disabled".to_string(),
            ));
        }

        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let score = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(self.default_score);

        Ok(AnomalyScore::new(score, request.len()))
    }

    async fn check_geofence(&self, _ping: &GeofencePing) -> Result<Vec<GeofenceAction>> {
        self.geofence_calls.fetch_add(1, Ordering::SeqCst);

        if !self.geofence_available.load(Ordering::SeqCst) {
            return Err(SafetyError::UpstreamUnavailable(
                "Mock geofence disabled".to_string(),
            ));
        }

        Ok(self
            .geofence_actions
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default())
    }
}
