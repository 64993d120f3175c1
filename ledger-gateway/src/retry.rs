//! Conflict retry policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Linear backoff on optimistic-concurrency conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff step (ms); the wait after attempt `n` is `n * step`
    pub backoff_step_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms * attempt as u64)
    }

    /// Policy with no backoff, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_step_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"backoff_step_ms": 50}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_step_ms, 50);
    }
}
