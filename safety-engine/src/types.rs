//! Shared value types.

use chaincode::KnownLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafetyError};

/// A coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(SafetyError::Validation(format!(
                "lat {} outside [-90, 90]",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(SafetyError::Validation(format!(
                "lon {} outside [-180, 180]",
                self.lon
            )));
        }
        Ok(())
    }
}

impl From<&KnownLocation> for GeoPoint {
    fn from(loc: &KnownLocation) -> Self {
        Self {
            lat: loc.lat,
            lon: loc.lon,
        }
    }
}

/// A location fix as reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub tourist_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Client-reported time; informational only
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

impl LocationInput {
    pub fn new(tourist_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            tourist_id: tourist_id.into(),
            device_id: None,
            lat,
            lon,
            speed: None,
            accuracy: None,
            ts: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// A persisted location sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Global persist sequence; the only ordering key
    pub seq: u64,
    pub tourist_id: String,
    pub device_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    /// Client-reported time, or persist time when absent
    pub ts: DateTime<Utc>,
    pub persisted_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Truncate to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(25.57, 91.88).validate().is_ok());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate().is_err());
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 200), "hi");
    }
}
