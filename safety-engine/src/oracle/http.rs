//! HTTP scoring oracle.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::*;
use crate::config::OracleConfig;
use crate::error::{Result, SafetyError};

/// Oracle reached over HTTP.
///
/// - `POST {base}/predict/anomaly`
/// - `POST {base}/ingest/ping`
pub struct HttpScoringOracle {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    #[serde(default)]
    actions: Vec<GeofenceAction>,
}

impl HttpScoringOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| SafetyError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| SafetyError::UpstreamUnavailable(format!("Oracle {path}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SafetyError::UpstreamUnavailable(format!(
                "Oracle {path}: HTTP {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SafetyError::UpstreamUnavailable(format!("Oracle {path}: bad response: {e}")))
    }
}

#[async_trait]
impl ScoringOracle for HttpScoringOracle {
    async fn score(&self, request: &ScoringRequest) -> Result<AnomalyScore> {
        debug!(points = request.len(), "Scoring window");
        self.post("/predict/anomaly", request).await
    }

    async fn check_geofence(&self, ping: &GeofencePing) -> Result<Vec<GeofenceAction>> {
        let response: PingResponse = self.post("/ingest/ping", ping).await?;
        Ok(response.actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let oracle = HttpScoringOracle::new(&OracleConfig {
            base_url: "http://ml.local:8080/".into(),
            timeout_ms: 100,
        })
        .unwrap();
        assert_eq!(oracle.url("/predict/anomaly"), "http://ml.local:8080/predict/anomaly");
    }

    #[tokio::test]
    async fn test_unreachable_maps_to_upstream_unavailable() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let oracle = HttpScoringOracle::new(&OracleConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_ms: 500,
        })
        .unwrap();

        let err = oracle
            .score(&ScoringRequest {
                latitudes: vec![1.0],
                longitudes: vec![2.0],
                timestamps: vec!["2026-01-01T00:00:00Z".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SafetyError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());
    }
}
