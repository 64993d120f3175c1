//! Schema validation for ledger records.
//!
//! Every mutating operation re-validates the full record before it is
//! written. Validation collects all issues instead of stopping at the
//! first one.

use chrono::{DateTime, Months, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ContractError, Result, ValidationIssue};
use crate::record::{EventType, TouristRecord};

static ID_PATTERN: OnceLock<Regex> = OnceLock::new();
static EVENT_ID_PATTERN: OnceLock<Regex> = OnceLock::new();
static KYC_HASH_PATTERN: OnceLock<Regex> = OnceLock::new();
static PHONE_PATTERN: OnceLock<Regex> = OnceLock::new();
static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

pub fn is_valid_tourist_id(id: &str) -> bool {
    compiled(&ID_PATTERN, r"^[a-zA-Z0-9_-]{1,64}$").is_match(id)
}

pub fn is_valid_event_id(id: &str) -> bool {
    compiled(&EVENT_ID_PATTERN, r"^[a-zA-Z0-9_:.-]{1,128}$").is_match(id)
}

/// Lowercase 64-character hex (SHA-256 digest).
pub fn is_valid_kyc_hash(hash: &str) -> bool {
    compiled(&KYC_HASH_PATTERN, r"^[a-f0-9]{64}$").is_match(hash)
}

pub fn is_valid_phone(phone: &str) -> bool {
    compiled(&PHONE_PATTERN, r"^\+?[\d\s\-()]{10,}$").is_match(phone)
}

pub fn is_valid_email(email: &str) -> bool {
    compiled(&EMAIL_PATTERN, r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_match(email)
}

fn finish(issues: Vec<ValidationIssue>) -> Result<()> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ContractError::Validation(issues))
    }
}

/// Validate a complete tourist record.
pub fn validate_tourist(record: &TouristRecord) -> Result<()> {
    let mut issues = Vec::new();

    if !is_valid_tourist_id(&record.tourist_id) {
        issues.push(ValidationIssue::new(
            "touristId",
            "must match ^[a-zA-Z0-9_-]{1,64}$",
        ));
    }
    if !is_valid_kyc_hash(&record.kyc_hash) {
        issues.push(ValidationIssue::new(
            "kycHash",
            "must be a lowercase SHA-256 hex string (64 characters)",
        ));
    }
    if record.issuer.trim().is_empty() {
        issues.push(ValidationIssue::new("issuer", "required"));
    }
    if record.issuer_id.trim().is_empty() {
        issues.push(ValidationIssue::new("issuerId", "required"));
    }
    if record.updated_at < record.created_at {
        issues.push(ValidationIssue::new("updatedAt", "must not precede createdAt"));
    }
    if record.metadata.version == 0 {
        issues.push(ValidationIssue::new("metadata.version", "must be at least 1"));
    }

    for (i, dest) in record.itinerary.destinations.iter().enumerate() {
        if dest.location.trim().is_empty() {
            issues.push(ValidationIssue::new(
                format!("itinerary.destinations[{i}].location"),
                "required",
            ));
        }
        if dest.end_date < dest.start_date {
            issues.push(ValidationIssue::new(
                format!("itinerary.destinations[{i}].endDate"),
                "must not precede startDate",
            ));
        }
    }

    for (i, contact) in record.emergency_contacts.iter().enumerate() {
        if contact.name.trim().is_empty() {
            issues.push(ValidationIssue::new(
                format!("emergencyContacts[{i}].name"),
                "required",
            ));
        }
        if !is_valid_phone(&contact.phone) {
            issues.push(ValidationIssue::new(
                format!("emergencyContacts[{i}].phone"),
                "must be at least 10 digits, spaces, dashes or parentheses",
            ));
        }
        if let Some(email) = &contact.email {
            if !is_valid_email(email) {
                issues.push(ValidationIssue::new(
                    format!("emergencyContacts[{i}].email"),
                    "not a valid email address",
                ));
            }
        }
    }

    if let Some(loc) = &record.metadata.last_known_location {
        check_coordinates(&mut issues, "metadata.lastKnownLocation", loc.lat, loc.lon);
    }

    finish(issues)
}

fn check_coordinates(issues: &mut Vec<ValidationIssue>, prefix: &str, lat: f64, lon: f64) {
    if !(-90.0..=90.0).contains(&lat) {
        issues.push(ValidationIssue::new(format!("{prefix}.lat"), "must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&lon) {
        issues.push(ValidationIssue::new(
            format!("{prefix}.lon"),
            "must be within [-180, 180]",
        ));
    }
}

/// Parse an expiry timestamp and require it to fall in `(now, now + 1 year]`.
pub fn validate_expiry(expiry_at: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let expiry = DateTime::parse_from_rfc3339(expiry_at)
        .map_err(|_| ContractError::invalid("expiryAt", "not a valid ISO-8601 timestamp"))?
        .with_timezone(&Utc);

    if expiry <= now {
        return Err(ContractError::invalid("expiryAt", "must be in the future"));
    }

    let limit = now
        .checked_add_months(Months::new(12))
        .ok_or_else(|| ContractError::invalid("expiryAt", "out of range"))?;
    if expiry > limit {
        return Err(ContractError::invalid(
            "expiryAt",
            "cannot be more than 1 year in the future",
        ));
    }

    Ok(expiry)
}

/// Validate a type-specific event payload.
pub fn validate_event_payload(event_type: EventType, payload: &serde_json::Value) -> Result<()> {
    let Some(obj) = payload.as_object() else {
        return Err(ContractError::invalid("payload", "must be a JSON object"));
    };

    let mut issues = Vec::new();
    match event_type {
        EventType::Location => {
            let lat = obj.get("lat").and_then(|v| v.as_f64());
            let lon = obj.get("lon").and_then(|v| v.as_f64());
            match (lat, lon) {
                (Some(lat), Some(lon)) => check_coordinates(&mut issues, "payload", lat, lon),
                _ => issues.push(ValidationIssue::new("payload", "lat and lon are required numbers")),
            }
        }
        EventType::Anomaly => match obj.get("score").and_then(|v| v.as_f64()) {
            Some(score) if (0.0..=1.0).contains(&score) => {}
            Some(_) => issues.push(ValidationIssue::new("payload.score", "must be within [0, 1]")),
            None => issues.push(ValidationIssue::new("payload.score", "required number")),
        },
        EventType::Feedback => {
            if let Some(rating) = obj.get("rating") {
                match rating.as_u64() {
                    Some(r) if (1..=5).contains(&r) => {}
                    _ => issues.push(ValidationIssue::new(
                        "payload.rating",
                        "must be an integer between 1 and 5",
                    )),
                }
            }
        }
        EventType::Sos | EventType::Efir => {}
    }

    finish(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;
    use crate::record::EmergencyContact;
    use chrono::Duration;

    #[test]
    fn test_patterns() {
        assert!(is_valid_tourist_id("t_1757964252657"));
        assert!(!is_valid_tourist_id("has space"));
        assert!(!is_valid_tourist_id(&"x".repeat(65)));

        assert!(is_valid_kyc_hash(
            "40e928dffa9836897433e9dbb8f6298c9ac051a5c06499d28c2b5937f777e4df"
        ));
        assert!(!is_valid_kyc_hash(&"A".repeat(64)));
        assert!(!is_valid_kyc_hash("abc"));

        assert!(is_valid_phone("+91 (987) 654-3210"));
        assert!(!is_valid_phone("12345"));
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn test_valid_record_passes() {
        assert!(validate_tourist(&sample_record("t1", "desk")).is_ok());
    }

    #[test]
    fn test_collects_all_issues() {
        let mut record = sample_record("bad id!", "desk");
        record.kyc_hash = "short".into();
        record.emergency_contacts.push(EmergencyContact {
            name: String::new(),
            relationship: None,
            phone: "1".into(),
            email: Some("nope".into()),
        });

        match validate_tourist(&record) {
            Err(ContractError::Validation(issues)) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
                assert!(fields.contains(&"touristId"));
                assert!(fields.contains(&"kycHash"));
                assert!(fields.contains(&"emergencyContacts[1].name"));
                assert!(fields.contains(&"emergencyContacts[1].phone"));
                assert!(fields.contains(&"emergencyContacts[1].email"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let ok = (now + Duration::days(30)).to_rfc3339();
        let past = (now - Duration::seconds(1)).to_rfc3339();
        let too_far = (now + Duration::days(400)).to_rfc3339();

        assert!(validate_expiry(&ok, now).is_ok());
        assert!(validate_expiry(&past, now).is_err());
        assert!(validate_expiry(&now.to_rfc3339(), now).is_err());
        assert!(validate_expiry(&too_far, now).is_err());
        assert!(validate_expiry("tomorrow", now).is_err());
    }

    #[test]
    fn test_event_payloads() {
        let loc = serde_json::json!({"lat": 25.57, "lon": 91.88});
        assert!(validate_event_payload(EventType::Location, &loc).is_ok());

        let bad_loc = serde_json::json!({"lat": 125.0, "lon": 91.88});
        assert!(validate_event_payload(EventType::Location, &bad_loc).is_err());

        let anomaly = serde_json::json!({"score": 0.9});
        assert!(validate_event_payload(EventType::Anomaly, &anomaly).is_ok());
        assert!(validate_event_payload(EventType::Anomaly, &serde_json::json!({"score": 1.5})).is_err());

        assert!(validate_event_payload(EventType::Sos, &serde_json::json!([1, 2])).is_err());
    }
}
