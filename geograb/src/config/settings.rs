//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Pagination and retry behaviour of the fetch engine
    pub fetch: FetchSettings,
    /// Pre-flight download limits
    pub safety: SafetySettings,
    /// Region registry location
    pub registry: RegistrySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Fetch engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Batch size override. 0 uses the layer's advertised page size.
    /// A non-zero value can only lower the page size, never raise it.
    pub batch_size: usize,
    /// Batch queries in flight per layer.
    /// Hard limits: 1-8 (values outside this range are clamped).
    pub max_concurrent_batches: usize,
    /// Retries after the first failed attempt of a request.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff between retries.
    /// Actual delay = base_delay * 2^(attempt-1) (e.g., 500ms, 1s, 2s, 4s)
    pub retry_base_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Timeout in seconds for service health checks.
    pub health_timeout_secs: u64,
    /// Known server cap on ids query results. 0 means uncapped.
    /// An ids response of exactly this length switches to offset paging.
    pub ids_query_cap: usize,
}

/// Safety evaluator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetySettings {
    pub warn_feature_count: u64,
    pub block_feature_count: u64,
    pub warn_extent_sq_deg: f64,
    pub block_extent_sq_deg: f64,
    /// Thresholds for high-density layer categories
    pub dense_warn_feature_count: u64,
    pub dense_block_feature_count: u64,
    pub est_bytes_per_feature: u64,
    pub warn_file_size_mb: f64,
    pub count_timeout_secs: u64,
    /// Layer categories that use the dense thresholds
    pub high_density_layers: Vec<String>,
}

/// Region registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// JSON registry file. `None` uses `regions.json` in the config directory.
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
