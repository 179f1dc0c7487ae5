//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors raised by the transport itself, before any response is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failure, timeout or truncated body
    #[error("Request to {url} failed: {message}")]
    Network {
        url: String,
        message: String,
        timed_out: bool,
    },

    /// Non-2xx response
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    ///
    /// Network failures, 5xx, 408 (request timeout) and 429 (rate limit) are
    /// transient. Other 4xx responses will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
        }
    }

    /// Whether the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Network { timed_out: true, .. })
    }
}

/// Trait for asynchronous HTTP client operations.
///
/// The remote query protocol only needs two verbs: `GET` with all
/// parameters in the URL, and form-encoded `POST` for queries whose
/// parameters do not fit in a URL (long object id lists, large polygons).
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an async HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request, query string included
    /// * `timeout` - Per-request timeout overriding the client default
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Performs an async HTTP POST with a form-encoded body.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to post to
    /// * `form` - Form fields as (name, value) pairs
    /// * `timeout` - Per-request timeout overriding the client default
    fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Default User-Agent string for HTTP requests.
pub const DEFAULT_USER_AGENT: &str = concat!("geograb/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a new AsyncReqwestClient with default configuration.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new AsyncReqwestClient with custom timeout.
    ///
    /// Batches for one layer go to the same host, so a modest idle pool is
    /// kept warm for the bounded batch concurrency.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Network {
                url: String::new(),
                message: format!("Failed to create async HTTP client: {}", e),
                timed_out: false,
            })?;

        Ok(Self { client })
    }

    async fn execute(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, TransportError> {
        let response = match request.send().await {
            Ok(resp) => {
                debug!(
                    url = url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(network_error(url, &e));
            }
        };

        // Check HTTP status
        if !response.status().is_success() {
            warn!(
                url = url,
                status = response.status().as_u16(),
                "HTTP error status"
            );
            return Err(TransportError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        // Read response body
        match response.bytes().await {
            Ok(bytes) => {
                trace!(url = url, bytes = bytes.len(), "HTTP response body read");
                Ok(bytes.to_vec())
            }
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                Err(network_error(url, &e))
            }
        }
    }
}

fn network_error(url: &str, e: &reqwest::Error) -> TransportError {
    TransportError::Network {
        url: url.to_string(),
        message: e.to_string(),
        timed_out: e.is_timeout(),
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError> {
        trace!(url = url, "HTTP GET request starting");
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.execute(url, request).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, TransportError> {
        trace!(url = url, fields = form.len(), "HTTP POST request starting");
        let mut request = self.client.post(url).form(form);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.execute(url, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| TransportError::Status {
            status,
            url: "http://x".to_string(),
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let err = TransportError::Network {
            url: "http://x".to_string(),
            message: "connection reset".to_string(),
            timed_out: false,
        };
        assert!(err.is_retryable());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(DEFAULT_USER_AGENT.starts_with("geograb/"));
    }
}
