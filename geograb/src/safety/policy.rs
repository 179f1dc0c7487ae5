//! Safety thresholds.

use std::time::Duration;

use crate::config::{
    DEFAULT_BLOCK_EXTENT_SQ_DEG, DEFAULT_BLOCK_FEATURE_COUNT, DEFAULT_COUNT_TIMEOUT_SECS,
    DEFAULT_DENSE_BLOCK_FEATURE_COUNT, DEFAULT_DENSE_WARN_FEATURE_COUNT,
    DEFAULT_EST_BYTES_PER_FEATURE, DEFAULT_HIGH_DENSITY_LAYERS, DEFAULT_WARN_EXTENT_SQ_DEG,
    DEFAULT_WARN_FEATURE_COUNT, DEFAULT_WARN_FILE_SIZE_MB,
};

/// Thresholds the safety evaluator applies.
///
/// # Example
///
/// ```
/// use geograb::safety::SafetyPolicy;
///
/// let policy = SafetyPolicy::default();
/// assert_eq!(policy.block_feature_count(), 100_000);
/// assert!(policy.is_high_density("Parcels"));
///
/// let strict = SafetyPolicy::new().with_feature_limits(1_000, 5_000);
/// assert_eq!(strict.warn_feature_count(), 1_000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyPolicy {
    warn_feature_count: u64,
    block_feature_count: u64,
    dense_warn_feature_count: u64,
    dense_block_feature_count: u64,
    warn_extent_sq_deg: f64,
    block_extent_sq_deg: f64,
    bytes_per_feature: u64,
    warn_file_size_mb: f64,
    count_timeout: Duration,
    /// Normalized category names (lowercase, underscores)
    high_density: Vec<String>,
}

impl SafetyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generic feature count thresholds.
    pub fn with_feature_limits(mut self, warn: u64, block: u64) -> Self {
        self.warn_feature_count = warn;
        self.block_feature_count = block;
        self
    }

    /// Feature count thresholds for high-density categories.
    pub fn with_dense_feature_limits(mut self, warn: u64, block: u64) -> Self {
        self.dense_warn_feature_count = warn;
        self.dense_block_feature_count = block;
        self
    }

    /// Area thresholds in square degrees of the WGS84 bounding rectangle.
    pub fn with_extent_limits(mut self, warn: f64, block: f64) -> Self {
        self.warn_extent_sq_deg = warn;
        self.block_extent_sq_deg = block;
        self
    }

    pub fn with_bytes_per_feature(mut self, bytes: u64) -> Self {
        self.bytes_per_feature = bytes;
        self
    }

    pub fn with_warn_file_size_mb(mut self, mb: f64) -> Self {
        self.warn_file_size_mb = mb;
        self
    }

    /// Timeout for the count query.
    pub fn with_count_timeout(mut self, timeout: Duration) -> Self {
        self.count_timeout = timeout;
        self
    }

    pub fn with_high_density_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.high_density = categories
            .into_iter()
            .map(|c| normalize(c.as_ref()))
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn warn_feature_count(&self) -> u64 {
        self.warn_feature_count
    }

    pub fn block_feature_count(&self) -> u64 {
        self.block_feature_count
    }

    pub fn dense_warn_feature_count(&self) -> u64 {
        self.dense_warn_feature_count
    }

    pub fn dense_block_feature_count(&self) -> u64 {
        self.dense_block_feature_count
    }

    pub fn warn_extent_sq_deg(&self) -> f64 {
        self.warn_extent_sq_deg
    }

    pub fn block_extent_sq_deg(&self) -> f64 {
        self.block_extent_sq_deg
    }

    pub fn bytes_per_feature(&self) -> u64 {
        self.bytes_per_feature
    }

    pub fn warn_file_size_mb(&self) -> f64 {
        self.warn_file_size_mb
    }

    pub fn count_timeout(&self) -> Duration {
        self.count_timeout
    }

    pub fn high_density_categories(&self) -> &[String] {
        &self.high_density
    }

    /// Whether a category or layer name belongs to a high-density class.
    ///
    /// Matches an exact category (`flood_zones`) as well as layer names
    /// containing the category stem (`Parcels 2024`, `Building Footprint`).
    pub fn is_high_density(&self, name: &str) -> bool {
        let name = normalize(name);
        if name.is_empty() {
            return false;
        }
        self.high_density.iter().any(|category| {
            let stem = category.trim_end_matches('s');
            name == *category || (!stem.is_empty() && name.contains(stem))
        })
    }

    /// Count thresholds `(warn, block)` for a layer.
    pub fn feature_limits(&self, high_density: bool) -> (u64, u64) {
        if high_density {
            (self.dense_warn_feature_count, self.dense_block_feature_count)
        } else {
            (self.warn_feature_count, self.block_feature_count)
        }
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            warn_feature_count: DEFAULT_WARN_FEATURE_COUNT,
            block_feature_count: DEFAULT_BLOCK_FEATURE_COUNT,
            dense_warn_feature_count: DEFAULT_DENSE_WARN_FEATURE_COUNT,
            dense_block_feature_count: DEFAULT_DENSE_BLOCK_FEATURE_COUNT,
            warn_extent_sq_deg: DEFAULT_WARN_EXTENT_SQ_DEG,
            block_extent_sq_deg: DEFAULT_BLOCK_EXTENT_SQ_DEG,
            bytes_per_feature: DEFAULT_EST_BYTES_PER_FEATURE,
            warn_file_size_mb: DEFAULT_WARN_FILE_SIZE_MB,
            count_timeout: Duration::from_secs(DEFAULT_COUNT_TIMEOUT_SECS),
            high_density: DEFAULT_HIGH_DENSITY_LAYERS.iter().map(|c| normalize(c)).collect(),
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
