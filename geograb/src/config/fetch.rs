//! Fetch engine configuration.

use std::time::Duration;

use super::defaults::{
    clamp_concurrent_batches, DEFAULT_MAX_CONCURRENT_BATCHES, DEFAULT_REQUEST_TIMEOUT_SECS,
    FALLBACK_BATCH_SIZE,
};
use crate::rest::RetryPolicy;

/// Configuration for paginated layer fetches.
///
/// Groups the parameters the fetch engine needs, providing sensible
/// defaults while allowing customization.
///
/// # Example
///
/// ```
/// use geograb::config::FetchConfig;
/// use std::time::Duration;
///
/// // Using defaults
/// let config = FetchConfig::default();
/// assert_eq!(config.max_concurrent(), 4);
/// assert_eq!(config.effective_batch_size(Some(2000)), 2000);
/// assert_eq!(config.effective_batch_size(None), 500);
///
/// // Custom configuration
/// let config = FetchConfig::new()
///     .with_batch_size(Some(250))
///     .with_max_concurrent(2)
///     .with_request_timeout(Duration::from_secs(15));
/// assert_eq!(config.effective_batch_size(Some(2000)), 250);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Page size override; only ever lowers the server value
    batch_size: Option<usize>,
    /// Batch queries in flight per layer
    max_concurrent: usize,
    /// Retry schedule applied to every batch
    retry: RetryPolicy,
    /// Per-request timeout
    request_timeout: Duration,
    /// Known server cap on ids query length
    ids_query_cap: Option<usize>,
}

impl FetchConfig {
    /// Create a new fetch configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size override.
    ///
    /// `None` uses the layer's advertised `maxRecordCount`. An override larger
    /// than that value is ignored, since servers silently truncate pages.
    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size.filter(|&n| n > 0);
        self
    }

    /// Set the number of batch queries in flight (clamped to 1-8).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = clamp_concurrent_batches(max_concurrent);
        self
    }

    /// Set the retry schedule for batch queries.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the known ids query cap.
    ///
    /// An ids response of exactly this length is treated as truncated.
    pub fn with_ids_query_cap(mut self, cap: Option<usize>) -> Self {
        self.ids_query_cap = cap.filter(|&n| n > 0);
        self
    }

    /// Get the batch size override.
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Get the number of batch queries in flight.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Get the retry schedule.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Get the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Get the ids query cap.
    pub fn ids_query_cap(&self) -> Option<usize> {
        self.ids_query_cap
    }

    /// Page size to use against a layer advertising `server_max`.
    pub fn effective_batch_size(&self, server_max: Option<usize>) -> usize {
        let server = server_max.filter(|&n| n > 0).unwrap_or(FALLBACK_BATCH_SIZE);
        match self.batch_size {
            Some(n) => n.min(server),
            None => server,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT_BATCHES,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            ids_query_cap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::MAX_CONCURRENT_BATCHES;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.batch_size(), None);
        assert_eq!(config.max_concurrent(), DEFAULT_MAX_CONCURRENT_BATCHES);
        assert_eq!(config.retry(), &RetryPolicy::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.ids_query_cap(), None);
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(FetchConfig::new(), FetchConfig::default());
    }

    #[test]
    fn test_with_batch_size() {
        let config = FetchConfig::new().with_batch_size(Some(100));
        assert_eq!(config.batch_size(), Some(100));
        assert_eq!(config.max_concurrent(), DEFAULT_MAX_CONCURRENT_BATCHES); // Unchanged
    }

    #[test]
    fn test_zero_batch_size_is_none() {
        let config = FetchConfig::new().with_batch_size(Some(0));
        assert_eq!(config.batch_size(), None);
    }

    #[test]
    fn test_max_concurrent_clamped() {
        assert_eq!(FetchConfig::new().with_max_concurrent(0).max_concurrent(), 1);
        assert_eq!(
            FetchConfig::new().with_max_concurrent(100).max_concurrent(),
            MAX_CONCURRENT_BATCHES
        );
    }

    #[test]
    fn test_effective_batch_size() {
        let config = FetchConfig::default();
        assert_eq!(config.effective_batch_size(Some(2000)), 2000);
        assert_eq!(config.effective_batch_size(Some(0)), FALLBACK_BATCH_SIZE);
        assert_eq!(config.effective_batch_size(None), FALLBACK_BATCH_SIZE);

        // Override can lower but not raise the server page size
        let config = config.with_batch_size(Some(5000));
        assert_eq!(config.effective_batch_size(Some(2000)), 2000);
        let config = config.with_batch_size(Some(300));
        assert_eq!(config.effective_batch_size(Some(2000)), 300);
    }

    #[test]
    fn test_builder_chain() {
        let config = FetchConfig::new()
            .with_batch_size(Some(250))
            .with_max_concurrent(2)
            .with_retry(RetryPolicy::once())
            .with_request_timeout(Duration::from_secs(5))
            .with_ids_query_cap(Some(1000));

        assert_eq!(config.batch_size(), Some(250));
        assert_eq!(config.max_concurrent(), 2);
        assert_eq!(config.retry().max_attempts, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.ids_query_cap(), Some(1000));
    }

    #[test]
    fn test_copy_semantics() {
        let config1 = FetchConfig::new().with_max_concurrent(3);
        let config2 = config1;
        assert_eq!(config1.max_concurrent(), config2.max_concurrent());
    }
}
