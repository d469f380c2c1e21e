use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::error::{NoisesError, Result};
use crate::payload::{GeneratePayload, GenerateResponse};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// The inference service as seen by the front-end.
///
/// [`BackendClient`] talks HTTP; tests substitute their own implementation
/// to count calls and script responses.
pub trait Backend: Send + Sync {
    /// `true` when the service answered the liveness probe with a success status.
    fn health(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Run one generation and return the produced files.
    fn generate(
        &self,
        payload: &GeneratePayload,
    ) -> impl Future<Output = Result<GenerateResponse>> + Send;
}

/// Async HTTP client for the local generation service.
///
/// # Example
/// ```no_run
/// use noises::{Backend, BackendClient};
///
/// # async fn example() -> noises::Result<()> {
/// let client = BackendClient::new("http://127.0.0.1:8000");
/// let ready = client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    endpoint: String,
    health_timeout: Duration,
    generate_timeout: Option<Duration>,
}

impl BackendClient {
    /// Create a new client pointing at the given service endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
            health_timeout: Duration::from_secs(5),
            generate_timeout: None,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Per-request timeout applied to each liveness probe.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Transport-level timeout for `/generate`. Unset by default; the
    /// pipeline applies its own timeout around the whole call.
    pub fn with_generate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.generate_timeout = timeout;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Backend for BackendClient {
    async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| NoisesError::Network {
                context: format!(
                    "Cannot connect to the generation backend at {}",
                    self.endpoint
                ),
                source: e,
            })?;
        Ok(resp.status().is_success())
    }

    async fn generate(&self, payload: &GeneratePayload) -> Result<GenerateResponse> {
        let url = format!("{}/generate", self.endpoint);
        let mut request = self.http.post(&url).json(payload);
        if let Some(timeout) = self.generate_timeout {
            request = request.timeout(timeout);
        }

        let resp = request.send().await.map_err(|e| NoisesError::Network {
            context: format!("Backend request to {} failed", url),
            source: e,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(error_from_body(status, body));
        }

        resp.json::<GenerateResponse>()
            .await
            .map_err(|e| NoisesError::Network {
                context: "Failed to parse /generate response".into(),
                source: e,
            })
    }
}

/// Turn a failed response into an error, preferring the service's `detail`
/// message when the body carries one.
pub(crate) fn error_from_body(status: u16, body: String) -> NoisesError {
    if let Ok(json) = serde_json::from_str::<Value>(&body) {
        if let Some(detail) = json.get("detail").and_then(|d| d.as_str()) {
            return NoisesError::Rejected(detail.to_string());
        }
    }
    NoisesError::Http { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize("http://localhost:8000/".into()), "http://localhost:8000");
        assert_eq!(normalize("http://localhost:8000".into()), "http://localhost:8000");
        assert_eq!(normalize("http://host:8000///".into()), "http://host:8000");
    }

    #[test]
    fn test_client_builder() {
        let client = BackendClient::new("http://127.0.0.1:9000/")
            .with_health_timeout(Duration::from_secs(1))
            .with_generate_timeout(Some(Duration::from_secs(30)));
        assert_eq!(client.endpoint(), "http://127.0.0.1:9000");
        assert_eq!(client.health_timeout, Duration::from_secs(1));
        assert_eq!(client.generate_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_error_prefers_detail() {
        let err = error_from_body(500, r#"{"detail": "CUDA out of memory"}"#.into());
        assert_eq!(err.to_string(), "CUDA out of memory");
    }

    #[test]
    fn test_error_falls_back_to_status_and_body() {
        let err = error_from_body(502, "Bad Gateway".into());
        assert_eq!(err.to_string(), "Backend returned HTTP 502: Bad Gateway");

        let err = error_from_body(500, r#"{"detail": {"loc": ["body"]}}"#.into());
        assert!(matches!(err, NoisesError::Http { status: 500, .. }));
    }
}
