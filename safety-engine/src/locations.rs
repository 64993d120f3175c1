//! Per-tourist append-only location log.
//!
//! Samples are ordered by a global persist sequence assigned while the
//! tourist's entry is locked, so concurrent reports from several devices
//! never interleave out of order. Client timestamps are carried but never
//! used for ordering.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{LocationInput, LocationSample};

pub struct LocationLog {
    samples: DashMap<String, VecDeque<LocationSample>>,
    next_seq: AtomicU64,
    max_per_tourist: usize,
}

impl LocationLog {
    pub fn new(max_per_tourist: usize) -> Self {
        Self {
            samples: DashMap::new(),
            next_seq: AtomicU64::new(1),
            max_per_tourist: max_per_tourist.max(1),
        }
    }

    /// Persist a sample and return it with its sequence number.
    pub fn append(&self, input: &LocationInput) -> LocationSample {
        let mut entry = self.samples.entry(input.tourist_id.clone()).or_default();

        let now = Utc::now();
        let sample = LocationSample {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            tourist_id: input.tourist_id.clone(),
            device_id: input.device_id.clone(),
            lat: input.lat,
            lon: input.lon,
            speed: input.speed,
            accuracy: input.accuracy,
            ts: input.ts.unwrap_or(now),
            persisted_at: now,
        };

        entry.push_back(sample.clone());
        while entry.len() > self.max_per_tourist {
            entry.pop_front();
        }
        sample
    }

    /// Snapshot of the latest `n` samples, oldest first.
    pub fn recent(&self, tourist_id: &str, n: usize) -> Vec<LocationSample> {
        let Some(entry) = self.samples.get(tourist_id) else {
            return Vec::new();
        };
        let skip = entry.len().saturating_sub(n);
        entry.iter().skip(skip).cloned().collect()
    }

    pub fn count(&self, tourist_id: &str) -> usize {
        self.samples.get(tourist_id).map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for LocationLog {
    fn default() -> Self {
        Self::new(1_000)
    }
}
