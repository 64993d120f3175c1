//! Error types for contract execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single schema violation found while validating a record or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path of the offending field (e.g. `emergencyContacts[0].phone`)
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl ValidationIssue {
    /// Create a new issue.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse error classification shared by every layer of the stack.
///
/// Callers use it to tell "try again" apart from "this will never succeed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema, shape or range failure
    Validation,
    /// Role or org mismatch
    Authorization,
    /// Referenced key absent
    NotFound,
    /// Key already present
    AlreadyExists,
    /// Optimistic-concurrency clash
    Conflict,
    /// Lost an accept-once race
    AlreadyClaimed,
    /// Ledger or oracle unreachable
    UpstreamUnavailable,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Whether an identical retry might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::UpstreamUnavailable)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::AlreadyClaimed => "already_claimed",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while simulating or committing a contract transaction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContractError {
    /// Record or request failed schema validation
    #[error("Validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Malformed or missing argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller lacks the required role or ownership
    #[error("Access denied: {0}")]
    Unauthorized(String),

    /// Referenced key does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Key already exists
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Status transition not permitted from the current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Another writer committed a newer version of the key
    #[error("MVCC read conflict on key {key}")]
    Conflict { key: String },

    /// Underlying store failure
    #[error("Ledger store error: {0}")]
    Store(String),
}

impl ContractError {
    /// Single-issue validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ContractError::Validation(vec![ValidationIssue::new(field, message)])
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Validation(_)
            | ContractError::InvalidArgument(_)
            | ContractError::InvalidTransition(_) => ErrorKind::Validation,
            ContractError::Unauthorized(_) => ErrorKind::Authorization,
            ContractError::NotFound(_) => ErrorKind::NotFound,
            ContractError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ContractError::Conflict { .. } => ErrorKind::Conflict,
            ContractError::Store(_) => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Whether this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ContractError::Conflict { .. })
    }
}

impl From<serde_json::Error> for ContractError {
    fn from(e: serde_json::Error) -> Self {
        ContractError::InvalidArgument(format!("Invalid JSON: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            ContractError::invalid("kycHash", "bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ContractError::AlreadyExists("Tourist t1".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert!(ContractError::Conflict { key: "k".into() }.kind().is_retryable());
        assert!(!ContractError::Unauthorized("no".into()).kind().is_retryable());
    }

    #[test]
    fn test_validation_message_lists_issues() {
        let err = ContractError::Validation(vec![
            ValidationIssue::new("touristId", "required"),
            ValidationIssue::new("kycHash", "must be 64 hex characters"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("touristId: required"));
        assert!(msg.contains("kycHash: must be 64 hex characters"));
    }
}
