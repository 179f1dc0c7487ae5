//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants, the clamping helpers, and the
//! `ConfigFile::default()` implementation.

use super::settings::*;

// =============================================================================
// Fetch defaults
// =============================================================================

/// Page size used when a layer advertises none (or an invalid one).
pub const FALLBACK_BATCH_SIZE: usize = 500;

/// Default batch size override (0 = use the server-advertised value).
pub const DEFAULT_BATCH_SIZE: usize = 0;

/// Default number of batch queries in flight per layer.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

/// Minimum batch concurrency.
pub const MIN_CONCURRENT_BATCHES: usize = 1;

/// Maximum batch concurrency.
/// ArcGIS servers start answering 429 well before this under shared load.
pub const MAX_CONCURRENT_BATCHES: usize = 8;

/// Default retries after the first failed attempt of a batch.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Default retry backoff base delay in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Upper bound for a single backoff sleep in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default ids query cap (0 = trust the ids query to be complete).
pub const DEFAULT_IDS_QUERY_CAP: usize = 0;

// =============================================================================
// Safety defaults
// =============================================================================

pub const DEFAULT_WARN_FEATURE_COUNT: u64 = 10_000;
pub const DEFAULT_BLOCK_FEATURE_COUNT: u64 = 100_000;
pub const DEFAULT_WARN_EXTENT_SQ_DEG: f64 = 0.25;
pub const DEFAULT_BLOCK_EXTENT_SQ_DEG: f64 = 2.0;
pub const DEFAULT_DENSE_WARN_FEATURE_COUNT: u64 = 5_000;
pub const DEFAULT_DENSE_BLOCK_FEATURE_COUNT: u64 = 50_000;

/// Average GeoPackage bytes per feature, for the output size estimate.
pub const DEFAULT_EST_BYTES_PER_FEATURE: u64 = 2_000;

/// Estimated output size above which a download warns.
pub const DEFAULT_WARN_FILE_SIZE_MB: f64 = 100.0;

/// Timeout for the pre-flight count query in seconds.
pub const DEFAULT_COUNT_TIMEOUT_SECS: u64 = 30;

/// Layer categories with fine-grained features.
pub const DEFAULT_HIGH_DENSITY_LAYERS: &[&str] = &[
    "parcels",
    "address_points",
    "building_footprints",
    "contours",
    "flood_zones",
];

/// Health check timeout in seconds.
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 10;

/// Clamps batch concurrency to the valid range and logs a warning if clamped.
pub(super) fn clamp_concurrent_batches(value: usize) -> usize {
    if value < MIN_CONCURRENT_BATCHES {
        tracing::warn!(
            requested = value,
            min = MIN_CONCURRENT_BATCHES,
            max = MAX_CONCURRENT_BATCHES,
            "max_concurrent_batches below minimum, clamping to {}",
            MIN_CONCURRENT_BATCHES
        );
        MIN_CONCURRENT_BATCHES
    } else if value > MAX_CONCURRENT_BATCHES {
        tracing::warn!(
            requested = value,
            min = MIN_CONCURRENT_BATCHES,
            max = MAX_CONCURRENT_BATCHES,
            "max_concurrent_batches above maximum, clamping to {} (avoids server rate limiting)",
            MAX_CONCURRENT_BATCHES
        );
        MAX_CONCURRENT_BATCHES
    } else {
        value
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = super::file::config_directory();

        Self {
            fetch: FetchSettings {
                batch_size: DEFAULT_BATCH_SIZE,
                max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
                ids_query_cap: DEFAULT_IDS_QUERY_CAP,
            },
            safety: SafetySettings {
                warn_feature_count: DEFAULT_WARN_FEATURE_COUNT,
                block_feature_count: DEFAULT_BLOCK_FEATURE_COUNT,
                warn_extent_sq_deg: DEFAULT_WARN_EXTENT_SQ_DEG,
                block_extent_sq_deg: DEFAULT_BLOCK_EXTENT_SQ_DEG,
                dense_warn_feature_count: DEFAULT_DENSE_WARN_FEATURE_COUNT,
                dense_block_feature_count: DEFAULT_DENSE_BLOCK_FEATURE_COUNT,
                est_bytes_per_feature: DEFAULT_EST_BYTES_PER_FEATURE,
                warn_file_size_mb: DEFAULT_WARN_FILE_SIZE_MB,
                count_timeout_secs: DEFAULT_COUNT_TIMEOUT_SECS,
                high_density_layers: DEFAULT_HIGH_DENSITY_LAYERS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            registry: RegistrySettings { path: None },
            logging: LoggingSettings {
                file: config_dir.join("geograb.log"),
            },
        }
    }
}
