//! Gateway error types.

use chaincode::{ContractError, ErrorKind};

/// Errors surfaced by ledger submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The contract rejected the transaction
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Every attempt hit an optimistic-concurrency conflict
    #[error("Conflict on {key} persisted after {attempts} attempts")]
    ConflictAfterRetries { key: String, attempts: u32 },

    /// Ledger network unreachable
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Response payload could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),
}

impl GatewayError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Contract(e) => e.kind(),
            GatewayError::ConflictAfterRetries { .. } => ErrorKind::Conflict,
            GatewayError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            GatewayError::Codec(_) => ErrorKind::Internal,
        }
    }

    /// Whether this is a single retryable MVCC conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Contract(e) if e.is_conflict())
    }

    /// Key named by a conflict, if any.
    pub fn conflict_key(&self) -> Option<&str> {
        match self {
            GatewayError::Contract(ContractError::Conflict { key })
            | GatewayError::ConflictAfterRetries { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let single: GatewayError = ContractError::Conflict { key: "tourist:t1".into() }.into();
        assert!(single.is_conflict());
        assert_eq!(single.conflict_key(), Some("tourist:t1"));

        let exhausted = GatewayError::ConflictAfterRetries {
            key: "tourist:t1".into(),
            attempts: 3,
        };
        assert!(!exhausted.is_conflict());
        assert_eq!(exhausted.kind(), ErrorKind::Conflict);
        assert_ne!(exhausted.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_contract_kinds_pass_through() {
        let err: GatewayError = ContractError::NotFound("Tourist t9".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
        assert!(GatewayError::Unavailable("peer down".into()).is_retryable());
    }
}
