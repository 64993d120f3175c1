//! Safety engine errors.

use chaincode::ErrorKind;
use ledger_gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    /// Request failed shape or range checks
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller may not perform the action
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Referenced entity is absent
    #[error("{0} not found")]
    NotFound(String),

    /// Status does not allow the action; retrying will not help
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Another caller already accepted the alert
    #[error("Alert {alert_id} already claimed by {accepted_by}")]
    AlreadyClaimed {
        alert_id: String,
        accepted_by: String,
    },

    /// Scoring oracle or other collaborator unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Payload could not be sealed or opened
    #[error("Sealing error: {0}")]
    Sealing(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger submission failed
    #[error(transparent)]
    Ledger(#[from] GatewayError),
}

impl SafetyError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SafetyError::Validation(_) | SafetyError::InvalidTransition(_) => {
                ErrorKind::Validation
            }
            SafetyError::Authorization(_) => ErrorKind::Authorization,
            SafetyError::NotFound(_) => ErrorKind::NotFound,
            SafetyError::AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            SafetyError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            SafetyError::Sealing(_) | SafetyError::Config(_) => ErrorKind::Internal,
            SafetyError::Ledger(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, SafetyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chaincode::ContractError;

    #[test]
    fn test_ledger_errors_keep_their_kind() {
        let err: SafetyError =
            GatewayError::from(ContractError::Unauthorized("nope".into())).into();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let err: SafetyError = GatewayError::ConflictAfterRetries {
            key: "tourist:t1".into(),
            attempts: 3,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_already_claimed_is_final() {
        let err = SafetyError::AlreadyClaimed {
            alert_id: "a1".into(),
            accepted_by: "officer-1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::AlreadyClaimed);
        assert!(!err.is_retryable());
        assert!(SafetyError::UpstreamUnavailable("oracle".into()).is_retryable());
    }

    #[test]
    fn test_invalid_transition_is_final() {
        let err = SafetyError::InvalidTransition("alert a1 is resolved".into());
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
    }
}
