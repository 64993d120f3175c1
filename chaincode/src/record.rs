//! Ledger-owned record types.
//!
//! Field names serialize in camelCase so the JSON stored on the ledger
//! matches what off-chain clients read back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stored or derived status of a tourist identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouristStatus {
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl TouristStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TouristStatus::Active => "active",
            TouristStatus::Suspended => "suspended",
            TouristStatus::Revoked => "revoked",
            TouristStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for TouristStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<String>,
}

/// Travel plan attached to a tourist record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transportation: Vec<serde_json::Value>,
}

impl Itinerary {
    /// Public summary: destinations with dates, nothing else.
    pub fn summary(&self) -> Itinerary {
        Itinerary {
            destinations: self
                .destinations
                .iter()
                .map(|d| Destination {
                    location: d.location.clone(),
                    start_date: d.start_date,
                    end_date: d.end_date,
                    accommodation: None,
                })
                .collect(),
            transportation: Vec::new(),
        }
    }
}

/// Person to reach in an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Last location fix recorded on-ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownLocation {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
}

/// Metadata keys written only by the contract itself.
pub const RESERVED_METADATA_KEYS: &[&str] = &[
    "version",
    "revocationReason",
    "revokedAt",
    "suspensionReason",
    "suspendedAt",
    "reinstatedAt",
    "lastVerified",
    "lastKnownLocation",
];

/// Extension bag on a tourist record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouristMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinstated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_location: Option<KnownLocation>,
    /// Incremented by exactly one per mutating operation
    #[serde(default)]
    pub version: u64,
    /// Free-form caller-supplied keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A tourist identity as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouristRecord {
    pub tourist_id: String,
    /// SHA-256 of the KYC payload, immutable after creation
    pub kyc_hash: String,
    #[serde(default)]
    pub itinerary: Itinerary,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Org of the registering caller
    pub issuer: String,
    /// Identity of the registering caller
    pub issuer_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub status: TouristStatus,
    #[serde(default)]
    pub metadata: TouristMetadata,
}

impl TouristRecord {
    /// Status as seen at `now`.
    ///
    /// Revoked and suspended are sticky; otherwise expiry decides.
    pub fn derived_status(&self, now: DateTime<Utc>) -> TouristStatus {
        match self.status {
            TouristStatus::Revoked => TouristStatus::Revoked,
            TouristStatus::Suspended => TouristStatus::Suspended,
            _ if now > self.expiry_at => TouristStatus::Expired,
            _ => TouristStatus::Active,
        }
    }

    /// Replace the status field with the derived status.
    pub fn with_derived_status(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.derived_status(now);
        self
    }

    /// Advance `updatedAt` without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Record a mutating operation.
    pub fn bump_version(&mut self, now: DateTime<Utc>) {
        self.metadata.version += 1;
        self.touch(now);
    }

    pub fn version(&self) -> u64 {
        self.metadata.version
    }
}

/// Kind of an append-only event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Location,
    Sos,
    Feedback,
    Efir,
    Anomaly,
}

impl EventType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Location => "location",
            EventType::Sos => "sos",
            EventType::Feedback => "feedback",
            EventType::Efir => "efir",
            EventType::Anomaly => "anomaly",
        }
    }

    /// Contract function that appends this event type.
    pub fn function_name(&self) -> &'static str {
        match self {
            EventType::Location => "RecordLocation",
            EventType::Sos => "RecordSOS",
            EventType::Feedback => "RecordFeedback",
            EventType::Efir => "RecordEFIR",
            EventType::Anomaly => "RecordAnomaly",
        }
    }

    /// Ledger event emitted when this type is recorded.
    pub fn event_name(&self) -> &'static str {
        match self {
            EventType::Location => "LocationRecorded",
            EventType::Sos => "SOSRecorded",
            EventType::Feedback => "FeedbackRecorded",
            EventType::Efir => "EFIRRecorded",
            EventType::Anomaly => "AnomalyRecorded",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable event appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    pub tourist_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Commit-time timestamp of the recording transaction
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub tx_id: String,
}
