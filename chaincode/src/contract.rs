//! Tourist identity contract.
//!
//! Every method takes an explicit [`CallerContext`] and a [`TxStub`]. The
//! contract authorizes, validates, mutates the stub's write-set and sets at
//! most one event. Committing (or discarding) the stub is the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::caller::{AccessPolicy, CallerContext, Operation};
use crate::error::{ContractError, Result, ValidationIssue};
use crate::events;
use crate::query::RichQuery;
use crate::record::{
    EmergencyContact, EventRecord, EventType, Itinerary, KnownLocation, TouristMetadata,
    TouristRecord, TouristStatus, RESERVED_METADATA_KEYS,
};
use crate::store::prefix_end;
use crate::stub::TxStub;
use crate::validation::{
    is_valid_event_id, is_valid_kyc_hash, is_valid_tourist_id, validate_event_payload,
    validate_expiry, validate_tourist,
};

pub const TOURIST_PREFIX: &str = "tourist:";
pub const EVENT_PREFIX: &str = "event:";

/// Page size used for internal scans.
const SCAN_PAGE: usize = 100;

pub fn tourist_key(tourist_id: &str) -> String {
    format!("{TOURIST_PREFIX}{tourist_id}")
}

pub fn event_key(event_id: &str) -> String {
    format!("{EVENT_PREFIX}{event_id}")
}

/// Contract configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Organizations whose members pass every role gate
    pub trusted_orgs: Vec<String>,
    /// Page size for `GetAllTourists` when none is given
    pub default_page_size: u32,
    /// Upper bound for `GetAllTourists` page size
    pub max_page_size: u32,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            trusted_orgs: Vec::new(),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Arguments of `RegisterTourist`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTourist {
    pub tourist_id: String,
    pub kyc_hash: String,
    #[serde(default)]
    pub itinerary: Itinerary,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
    /// RFC 3339 timestamp
    pub expiry_at: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Fields `UpdateTourist` may change. Anything else is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TouristUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<Itinerary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contacts: Option<Vec<EmergencyContact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_at: Option<String>,
}

/// Result of `VerifyTourist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub tourist_id: String,
    pub valid: bool,
    pub status: TouristStatus,
    pub expiry_at: DateTime<Utc>,
    pub issuer: String,
    pub last_known_itinerary: Itinerary,
    pub verified_at: DateTime<Utc>,
}

/// One entry of `GetTouristHistory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: Option<TouristRecord>,
}

/// A page of `GetAllTourists`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouristPage {
    pub records: Vec<TouristRecord>,
    pub fetched_records_count: usize,
    pub bookmark: Option<String>,
}

/// SHA-256 hex digest of a KYC payload's JSON encoding.
pub fn compute_kyc_hash(payload: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Merge caller-supplied metadata into `extra`, rejecting reserved keys.
fn merge_metadata(
    target: &mut TouristMetadata,
    incoming: BTreeMap<String, Value>,
) -> Result<()> {
    let reserved: Vec<ValidationIssue> = incoming
        .keys()
        .filter(|k| RESERVED_METADATA_KEYS.contains(&k.as_str()))
        .map(|k| ValidationIssue::new(format!("metadata.{k}"), "reserved, set by the contract"))
        .collect();
    if !reserved.is_empty() {
        return Err(ContractError::Validation(reserved));
    }
    target.extra.extend(incoming);
    Ok(())
}

fn require_tourist_id(tourist_id: &str) -> Result<()> {
    if is_valid_tourist_id(tourist_id) {
        Ok(())
    } else {
        Err(ContractError::invalid(
            "touristId",
            "must match ^[a-zA-Z0-9_-]{1,64}$",
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TouristContract {
    policy: AccessPolicy,
    config: ContractConfig,
}

impl TouristContract {
    pub fn new(config: ContractConfig) -> Self {
        Self {
            policy: AccessPolicy::with_trusted_orgs(config.trusted_orgs.clone()),
            config,
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Acknowledge ledger initialization. Writes nothing.
    pub async fn init_ledger(&self, stub: &mut TxStub) -> Result<()> {
        info!(tx_id = %stub.tx_id(), "Ledger initialized");
        Ok(())
    }

    async fn load_tourist(&self, stub: &mut TxStub, tourist_id: &str) -> Result<TouristRecord> {
        require_tourist_id(tourist_id)?;
        stub.get_json(&tourist_key(tourist_id))
            .await?
            .ok_or_else(|| ContractError::NotFound(format!("Tourist {tourist_id}")))
    }

    fn store_tourist(&self, stub: &mut TxStub, record: &TouristRecord) -> Result<()> {
        validate_tourist(record)?;
        stub.put_json(tourist_key(&record.tourist_id), record)
    }

    fn emit(&self, stub: &mut TxStub, name: &str, tourist_id: &str, extra: Value) {
        let mut payload = json!({
            "touristId": tourist_id,
            "timestamp": stub.timestamp(),
            "txId": stub.tx_id(),
        });
        if let (Some(base), Value::Object(more)) = (payload.as_object_mut(), extra) {
            base.extend(more);
        }
        stub.set_event(name, payload);
    }

    /// Create a new tourist identity.
    pub async fn register_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        request: RegisterTourist,
    ) -> Result<TouristRecord> {
        self.policy.authorize(caller, Operation::Register, None)?;
        require_tourist_id(&request.tourist_id)?;
        if !is_valid_kyc_hash(&request.kyc_hash) {
            return Err(ContractError::invalid(
                "kycHash",
                "must be a lowercase SHA-256 hex string (64 characters)",
            ));
        }

        let key = tourist_key(&request.tourist_id);
        if stub.get_state(&key).await?.is_some() {
            return Err(ContractError::AlreadyExists(format!(
                "Tourist {}",
                request.tourist_id
            )));
        }

        let now = stub.timestamp();
        let expiry_at = validate_expiry(&request.expiry_at, now)?;

        let mut metadata = TouristMetadata {
            version: 1,
            ..Default::default()
        };
        merge_metadata(&mut metadata, request.metadata)?;

        let record = TouristRecord {
            tourist_id: request.tourist_id,
            kyc_hash: request.kyc_hash,
            itinerary: request.itinerary,
            emergency_contacts: request.emergency_contacts,
            issuer: caller.org.clone(),
            issuer_id: caller.identity.clone(),
            created_at: now,
            updated_at: now,
            expiry_at,
            status: TouristStatus::Active,
            metadata,
        };
        self.store_tourist(stub, &record)?;

        self.emit(
            stub,
            events::TOURIST_REGISTERED,
            &record.tourist_id,
            json!({ "issuer": record.issuer, "createdAt": record.created_at }),
        );
        info!(
            tourist_id = %record.tourist_id,
            issuer = %record.issuer,
            tx_id = %stub.tx_id(),
            "Tourist registered"
        );
        Ok(record)
    }

    /// Read a tourist record with its derived status.
    pub async fn get_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
    ) -> Result<TouristRecord> {
        self.policy.authorize(caller, Operation::Read, None)?;
        let record = self.load_tourist(stub, tourist_id).await?;
        Ok(record.with_derived_status(stub.timestamp()))
    }

    pub async fn tourist_exists(&self, stub: &mut TxStub, tourist_id: &str) -> Result<bool> {
        require_tourist_id(tourist_id)?;
        Ok(stub.get_state(&tourist_key(tourist_id)).await?.is_some())
    }

    /// Append an immutable event for an existing tourist.
    ///
    /// Location events also refresh the tourist's `lastKnownLocation` and
    /// `updatedAt` without bumping the version.
    pub async fn record_event(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        event_type: EventType,
        event_id: &str,
        tourist_id: &str,
        payload: Value,
    ) -> Result<EventRecord> {
        self.policy.authorize(caller, Operation::RecordEvent, None)?;
        if !is_valid_event_id(event_id) {
            return Err(ContractError::invalid(
                "eventId",
                "must match ^[a-zA-Z0-9_:.-]{1,128}$",
            ));
        }
        validate_event_payload(event_type, &payload)?;

        let mut tourist = self.load_tourist(stub, tourist_id).await?;

        let key = event_key(event_id);
        if stub.get_state(&key).await?.is_some() {
            return Err(ContractError::AlreadyExists(format!("Event {event_id}")));
        }

        let now = stub.timestamp();
        let event = EventRecord {
            event_id: event_id.to_string(),
            tourist_id: tourist_id.to_string(),
            event_type,
            timestamp: now,
            data: payload,
            tx_id: stub.tx_id().to_string(),
        };
        stub.put_json(key, &event)?;

        if event_type == EventType::Location {
            let lat = event.data.get("lat").and_then(Value::as_f64).unwrap_or_default();
            let lon = event.data.get("lon").and_then(Value::as_f64).unwrap_or_default();
            let timestamp = event
                .data
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(now);
            tourist.metadata.last_known_location = Some(KnownLocation { lat, lon, timestamp });
            tourist.touch(now);
            self.store_tourist(stub, &tourist)?;
        }

        let mut payload = json!({
            "eventId": event.event_id,
            "touristId": event.tourist_id,
            "timestamp": now,
            "txId": event.tx_id,
        });
        if event_type == EventType::Anomaly {
            payload["score"] = event.data.get("score").cloned().unwrap_or(Value::Null);
        }
        stub.set_event(event_type.event_name(), payload);

        debug!(
            event_id = %event.event_id,
            tourist_id = %event.tourist_id,
            event_type = %event_type,
            "Event recorded"
        );
        Ok(event)
    }

    /// Merge permitted fields into an existing record.
    pub async fn update_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
        update: TouristUpdate,
    ) -> Result<TouristRecord> {
        self.policy.check_gate(caller, Operation::Update)?;
        let mut record = self.load_tourist(stub, tourist_id).await?;
        self.policy.check_record(caller, Operation::Update, &record)?;
        if record.status == TouristStatus::Revoked {
            return Err(ContractError::InvalidTransition(format!(
                "Tourist {tourist_id} is revoked"
            )));
        }

        let now = stub.timestamp();
        if let Some(itinerary) = update.itinerary {
            record.itinerary = itinerary;
        }
        if let Some(contacts) = update.emergency_contacts {
            record.emergency_contacts = contacts;
        }
        if let Some(metadata) = update.metadata {
            merge_metadata(&mut record.metadata, metadata)?;
        }
        if let Some(expiry_at) = update.expiry_at {
            record.expiry_at = validate_expiry(&expiry_at, now)?;
        }

        record.bump_version(now);
        self.store_tourist(stub, &record)?;
        self.emit(
            stub,
            events::TOURIST_UPDATED,
            tourist_id,
            json!({ "version": record.version() }),
        );
        Ok(record.with_derived_status(now))
    }

    pub async fn suspend_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
        reason: Option<String>,
    ) -> Result<TouristRecord> {
        self.policy.check_gate(caller, Operation::Suspend)?;
        let mut record = self.load_tourist(stub, tourist_id).await?;
        self.policy.check_record(caller, Operation::Suspend, &record)?;
        if record.status == TouristStatus::Revoked {
            return Err(ContractError::InvalidTransition(format!(
                "Tourist {tourist_id} is revoked"
            )));
        }

        let now = stub.timestamp();
        record.status = TouristStatus::Suspended;
        record.metadata.suspension_reason = reason.filter(|r| !r.is_empty());
        record.metadata.suspended_at = Some(now);
        record.bump_version(now);
        self.store_tourist(stub, &record)?;

        self.emit(
            stub,
            events::TOURIST_SUSPENDED,
            tourist_id,
            json!({ "reason": record.metadata.suspension_reason }),
        );
        info!(tourist_id = %tourist_id, by = %caller.identity, "Tourist suspended");
        Ok(record)
    }

    /// Revoke a tourist identity. Terminal.
    pub async fn revoke_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
        reason: Option<String>,
    ) -> Result<TouristRecord> {
        self.policy.check_gate(caller, Operation::Revoke)?;
        let mut record = self.load_tourist(stub, tourist_id).await?;
        self.policy.check_record(caller, Operation::Revoke, &record)?;
        if record.status == TouristStatus::Revoked {
            return Err(ContractError::InvalidTransition(format!(
                "Tourist {tourist_id} is already revoked"
            )));
        }

        let now = stub.timestamp();
        record.status = TouristStatus::Revoked;
        record.metadata.revocation_reason = reason.filter(|r| !r.is_empty());
        record.metadata.revoked_at = Some(now);
        record.bump_version(now);
        self.store_tourist(stub, &record)?;

        self.emit(
            stub,
            events::TOURIST_REVOKED,
            tourist_id,
            json!({ "reason": record.metadata.revocation_reason }),
        );
        info!(tourist_id = %tourist_id, by = %caller.identity, "Tourist revoked");
        Ok(record)
    }

    /// Lift a suspension. Status recomputes from expiry on read.
    pub async fn reinstate_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
    ) -> Result<TouristRecord> {
        self.policy.check_gate(caller, Operation::Reinstate)?;
        let mut record = self.load_tourist(stub, tourist_id).await?;
        self.policy.check_record(caller, Operation::Reinstate, &record)?;
        if record.status != TouristStatus::Suspended {
            return Err(ContractError::InvalidTransition(format!(
                "Tourist {tourist_id} is {}, only suspended tourists can be reinstated",
                record.status
            )));
        }

        let now = stub.timestamp();
        record.status = TouristStatus::Active;
        record.metadata.suspension_reason = None;
        record.metadata.suspended_at = None;
        record.metadata.reinstated_at = Some(now);
        record.bump_version(now);
        self.store_tourist(stub, &record)?;

        let derived = record.derived_status(now);
        self.emit(
            stub,
            events::TOURIST_REINSTATED,
            tourist_id,
            json!({ "status": derived }),
        );
        Ok(record.with_derived_status(now))
    }

    /// Check whether a tourist identity is currently valid.
    ///
    /// When the derived status is active this stamps `lastVerified` and
    /// bumps the version; the write only lands if the stub is committed.
    pub async fn verify_tourist(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
    ) -> Result<VerificationResult> {
        self.policy.authorize(caller, Operation::Verify, None)?;
        let mut record = self.load_tourist(stub, tourist_id).await?;

        let now = stub.timestamp();
        let status = record.derived_status(now);
        let valid = status == TouristStatus::Active;

        if valid {
            record.metadata.last_verified = Some(now);
            record.bump_version(now);
            self.store_tourist(stub, &record)?;
            self.emit(
                stub,
                events::TOURIST_VERIFIED,
                tourist_id,
                json!({ "verifiedBy": caller.identity }),
            );
        }

        Ok(VerificationResult {
            tourist_id: record.tourist_id,
            valid,
            status,
            expiry_at: record.expiry_at,
            issuer: record.issuer,
            last_known_itinerary: record.itinerary.summary(),
            verified_at: now,
        })
    }

    async fn scan<T, F>(&self, stub: &TxStub, prefix: &str, mut keep: F) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut(&T) -> Result<bool>,
    {
        let end = prefix_end(prefix);
        let mut out = Vec::new();
        let mut bookmark: Option<String> = None;
        loop {
            let page = stub
                .range(prefix, &end, SCAN_PAGE, bookmark.as_deref())
                .await?;
            for (_, value) in page.entries {
                let item: T = serde_json::from_slice(&value.value)?;
                if keep(&item)? {
                    out.push(item);
                }
            }
            match page.bookmark {
                Some(next) => bookmark = Some(next),
                None => return Ok(out),
            }
        }
    }

    /// Rich query over tourists. Status is derived before matching.
    pub async fn query_tourists(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        query: &str,
    ) -> Result<Vec<TouristRecord>> {
        self.policy.authorize(caller, Operation::Query, None)?;
        let query = RichQuery::parse(query)?;
        self.run_tourist_query(stub, &query).await
    }

    async fn run_tourist_query(
        &self,
        stub: &TxStub,
        query: &RichQuery,
    ) -> Result<Vec<TouristRecord>> {
        let now = stub.timestamp();
        let mut records: Vec<TouristRecord> = self
            .scan(stub, TOURIST_PREFIX, |_: &TouristRecord| Ok(true))
            .await?
            .into_iter()
            .map(|r| r.with_derived_status(now))
            .collect();

        let mut matched = Vec::new();
        for record in records.drain(..) {
            let doc = serde_json::to_value(&record)?;
            if query.matches(&doc) {
                matched.push(record);
                if query.limit.is_some_and(|l| matched.len() >= l) {
                    break;
                }
            }
        }
        Ok(matched)
    }

    pub async fn query_by_kyc_hash(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        kyc_hash: &str,
    ) -> Result<Vec<TouristRecord>> {
        self.policy.authorize(caller, Operation::Query, None)?;
        if !is_valid_kyc_hash(kyc_hash) {
            return Err(ContractError::invalid(
                "kycHash",
                "must be a lowercase SHA-256 hex string (64 characters)",
            ));
        }
        let query = RichQuery::field_equals("kycHash", kyc_hash);
        self.run_tourist_query(stub, &query).await
    }

    pub async fn query_events(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        query: &str,
    ) -> Result<Vec<EventRecord>> {
        self.policy.authorize(caller, Operation::Query, None)?;
        let query = RichQuery::parse(query)?;
        let limit = query.limit.unwrap_or(usize::MAX);

        let mut count = 0usize;
        self.scan(stub, EVENT_PREFIX, |event: &EventRecord| {
            if count >= limit {
                return Ok(false);
            }
            let keep = query.matches(&serde_json::to_value(event)?);
            if keep {
                count += 1;
            }
            Ok(keep)
        })
        .await
    }

    /// Every committed version of a tourist record, oldest first.
    pub async fn get_tourist_history(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        tourist_id: &str,
    ) -> Result<Vec<HistoryEntry>> {
        self.policy.authorize(caller, Operation::History, None)?;
        require_tourist_id(tourist_id)?;

        let modifications = stub.history(&tourist_key(tourist_id)).await?;
        if modifications.is_empty() {
            return Err(ContractError::NotFound(format!("Tourist {tourist_id}")));
        }

        modifications
            .into_iter()
            .map(|m| -> Result<HistoryEntry> {
                let value = match m.value {
                    Some(bytes) if !m.is_delete => Some(serde_json::from_slice(&bytes)?),
                    _ => None,
                };
                Ok(HistoryEntry {
                    tx_id: m.tx_id,
                    timestamp: m.timestamp,
                    is_delete: m.is_delete,
                    value,
                })
            })
            .collect()
    }

    /// Paginated scan of all tourists.
    pub async fn get_all_tourists(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        page_size: Option<u32>,
        bookmark: Option<&str>,
    ) -> Result<TouristPage> {
        self.policy.authorize(caller, Operation::ListAll, None)?;
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        if page_size == 0 || page_size > self.config.max_page_size {
            return Err(ContractError::invalid(
                "pageSize",
                format!("must be within [1, {}]", self.config.max_page_size),
            ));
        }

        let now = stub.timestamp();
        let page = stub
            .range(
                TOURIST_PREFIX,
                &prefix_end(TOURIST_PREFIX),
                page_size as usize,
                bookmark.filter(|b| !b.is_empty()),
            )
            .await?;

        let records = page
            .entries
            .into_iter()
            .map(|(_, v)| {
                serde_json::from_slice::<TouristRecord>(&v.value)
                    .map(|r| r.with_derived_status(now))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(TouristPage {
            fetched_records_count: records.len(),
            records,
            bookmark: page.bookmark,
        })
    }

    pub async fn get_event(
        &self,
        caller: &CallerContext,
        stub: &mut TxStub,
        event_id: &str,
    ) -> Result<EventRecord> {
        self.policy.authorize(caller, Operation::Read, None)?;
        if !is_valid_event_id(event_id) {
            return Err(ContractError::invalid(
                "eventId",
                "must match ^[a-zA-Z0-9_:.-]{1,128}$",
            ));
        }
        stub.get_json(&event_key(event_id))
            .await?
            .ok_or_else(|| ContractError::NotFound(format!("Event {event_id}")))
    }
}
