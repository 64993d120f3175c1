//! Configuration for the safety engine.

use chaincode::{CallerContext, Role};
use ledger_gateway::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Location/anomaly pipeline
    pub pipeline: PipelineConfig,
    /// Ledger conflict retries
    pub retry: RetryPolicy,
    /// Notification fan-out
    pub notifications: NotificationConfig,
    /// Scoring oracle client
    pub oracle: OracleConfig,
    /// Off-chain projection
    pub projection: ProjectionConfig,
    /// Identity the engine uses for its own ledger writes
    pub ledger: LedgerIdentityConfig,
}

impl SafetyConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples in a scoring window; scoring waits until this many exist
    pub window_size: usize,
    /// Inclusive anomaly threshold (0.0 - 1.0)
    pub anomaly_threshold: f64,
    /// Trailing points copied into the on-ledger anomaly event
    pub ledger_trail: usize,
    /// Max characters of free text copied onto the ledger
    pub summary_chars: usize,
    /// Samples retained per tourist
    pub max_retained_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 21,
            anomaly_threshold: 0.65,
            ledger_trail: 5,
            summary_chars: 200,
            max_retained_samples: 1_000,
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Broadcast channel capacity; slow subscribers lag past this
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Scoring oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    /// Request timeout (ms)
    pub timeout_ms: u64,
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Projection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Capacity of the projection update channel
    pub channel_capacity: usize,
    /// 32-byte sealing key, hex or base64. A random key is generated when unset.
    pub sealing_key: Option<String>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            sealing_key: None,
        }
    }
}

/// Ledger identity of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerIdentityConfig {
    pub identity: String,
    pub org: String,
    pub role: Role,
}

impl LedgerIdentityConfig {
    pub fn caller(&self) -> CallerContext {
        CallerContext::new(self.identity.clone(), self.role, self.org.clone())
    }
}

impl Default for LedgerIdentityConfig {
    fn default() -> Self {
        Self {
            identity: "safety-engine".to_string(),
            org: "Org1MSP".to_string(),
            role: Role::Issuer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SafetyConfig::default();
        assert_eq!(config.pipeline.window_size, 21);
        assert_eq!(config.pipeline.anomaly_threshold, 0.65);
        assert_eq!(config.pipeline.ledger_trail, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_step_ms, 500);
        assert_eq!(config.oracle.timeout(), Duration::from_secs(10));
        assert_eq!(config.notifications.channel_capacity, 256);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = SafetyConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = SafetyConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.pipeline.window_size, 21);
        assert_eq!(parsed.ledger.role, Role::Issuer);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
pipeline:
  anomaly_threshold: 0.8
oracle:
  base_url: "http://ml.internal:9000"
"#;
        let config = SafetyConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pipeline.anomaly_threshold, 0.8);
        assert_eq!(config.pipeline.window_size, 21);
        assert_eq!(config.oracle.base_url, "http://ml.internal:9000");
        assert_eq!(config.oracle.timeout_ms, 10_000);
    }
}
