//! Positional-string transaction surface.
//!
//! Maps a function name plus string arguments onto typed contract calls
//! and returns the JSON-encoded result.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::caller::CallerContext;
use crate::contract::{compute_kyc_hash, RegisterTourist, TouristContract, TouristUpdate};
use crate::error::{ContractError, Result};
use crate::record::EventType;
use crate::stub::TxStub;

/// Functions that never write, whatever the caller does with the stub.
pub const READ_ONLY_FUNCTIONS: &[&str] = &[
    "GetTourist",
    "TouristExists",
    "ComputeKycHash",
    "GetEvent",
    "QueryTourists",
    "QueryByKycHash",
    "QueryEvents",
    "GetTouristHistory",
    "GetAllTourists",
];

pub fn is_read_only(function: &str) -> bool {
    READ_ONLY_FUNCTIONS.contains(&function)
}

fn event_type_for(function: &str) -> Option<EventType> {
    match function {
        "RecordLocation" => Some(EventType::Location),
        "RecordSOS" => Some(EventType::Sos),
        "RecordFeedback" => Some(EventType::Feedback),
        "RecordEFIR" => Some(EventType::Efir),
        "RecordAnomaly" => Some(EventType::Anomaly),
        _ => None,
    }
}

fn required<'a>(function: &str, args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        ContractError::InvalidArgument(format!("{function} requires argument {name}"))
    })
}

fn optional<'a>(args: &'a [String], index: usize) -> Option<&'a str> {
    args.get(index).map(String::as_str).filter(|s| !s.is_empty())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Invoke a contract function by name.
pub async fn invoke(
    contract: &TouristContract,
    caller: &CallerContext,
    stub: &mut TxStub,
    function: &str,
    args: &[String],
) -> Result<Vec<u8>> {
    if let Some(event_type) = event_type_for(function) {
        let event_id = required(function, args, 0, "eventId")?;
        let tourist_id = required(function, args, 1, "touristId")?;
        let payload: Value = serde_json::from_str(required(function, args, 2, "payloadJSON")?)?;
        let event = contract
            .record_event(caller, stub, event_type, event_id, tourist_id, payload)
            .await?;
        return encode(&event);
    }

    match function {
        "InitLedger" => {
            contract.init_ledger(stub).await?;
            Ok(Vec::new())
        }
        "RegisterTourist" => {
            let request = RegisterTourist {
                tourist_id: required(function, args, 0, "touristId")?.to_string(),
                kyc_hash: required(function, args, 1, "kycHash")?.to_string(),
                itinerary: serde_json::from_str(required(function, args, 2, "itineraryJSON")?)?,
                emergency_contacts: serde_json::from_str(required(
                    function,
                    args,
                    3,
                    "emergencyContactsJSON",
                )?)?,
                expiry_at: required(function, args, 4, "expiryAt")?.to_string(),
                metadata: match optional(args, 5) {
                    Some(raw) => serde_json::from_str::<BTreeMap<String, Value>>(raw)?,
                    None => BTreeMap::new(),
                },
            };
            encode(&contract.register_tourist(caller, stub, request).await?)
        }
        "GetTourist" => {
            let id = required(function, args, 0, "touristId")?;
            encode(&contract.get_tourist(caller, stub, id).await?)
        }
        "TouristExists" => {
            let id = required(function, args, 0, "touristId")?;
            encode(&contract.tourist_exists(stub, id).await?)
        }
        "UpdateTourist" => {
            let id = required(function, args, 0, "touristId")?;
            let update: TouristUpdate =
                serde_json::from_str(required(function, args, 1, "updatesJSON")?)?;
            encode(&contract.update_tourist(caller, stub, id, update).await?)
        }
        "SuspendTourist" => {
            let id = required(function, args, 0, "touristId")?;
            let reason = optional(args, 1).map(str::to_string);
            encode(&contract.suspend_tourist(caller, stub, id, reason).await?)
        }
        "RevokeTourist" => {
            let id = required(function, args, 0, "touristId")?;
            let reason = optional(args, 1).map(str::to_string);
            encode(&contract.revoke_tourist(caller, stub, id, reason).await?)
        }
        "ReinstateTourist" => {
            let id = required(function, args, 0, "touristId")?;
            encode(&contract.reinstate_tourist(caller, stub, id).await?)
        }
        "VerifyTourist" => {
            let id = required(function, args, 0, "touristId")?;
            encode(&contract.verify_tourist(caller, stub, id).await?)
        }
        "QueryTourists" => {
            let query = required(function, args, 0, "queryJSON")?;
            encode(&contract.query_tourists(caller, stub, query).await?)
        }
        "QueryByKycHash" => {
            let hash = required(function, args, 0, "kycHash")?;
            encode(&contract.query_by_kyc_hash(caller, stub, hash).await?)
        }
        "QueryEvents" => {
            let query = required(function, args, 0, "queryJSON")?;
            encode(&contract.query_events(caller, stub, query).await?)
        }
        "GetTouristHistory" => {
            let id = required(function, args, 0, "touristId")?;
            encode(&contract.get_tourist_history(caller, stub, id).await?)
        }
        "GetAllTourists" => {
            let page_size = optional(args, 0)
                .map(|raw| {
                    raw.parse::<u32>().map_err(|_| {
                        ContractError::invalid("pageSize", "must be a positive integer")
                    })
                })
                .transpose()?;
            let bookmark = optional(args, 1);
            encode(
                &contract
                    .get_all_tourists(caller, stub, page_size, bookmark)
                    .await?,
            )
        }
        "ComputeKycHash" => {
            let payload: Value =
                serde_json::from_str(required(function, args, 0, "payloadJSON")?)?;
            encode(&compute_kyc_hash(&payload)?)
        }
        "GetEvent" => {
            let id = required(function, args, 0, "eventId")?;
            encode(&contract.get_event(caller, stub, id).await?)
        }
        other => Err(ContractError::InvalidArgument(format!(
            "Unknown function {other}"
        ))),
    }
}
