//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`, and
//! `to_entries()` used by `geograb config list`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let registry_path = config
        .registry
        .path
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();

    format!(
        r#"[fetch]
; Page size override. 0 uses each layer's advertised maxRecordCount
; (or 500 when the server advertises none). Can only lower the page size.
batch_size = {}
; Batch queries in flight per layer (1-8)
max_concurrent_batches = {}
; Retries after a failed batch request (exponential backoff)
max_retries = {}
; Backoff base delay in milliseconds (delay doubles per attempt)
retry_base_delay_ms = {}
; Per-request timeout in seconds
request_timeout_secs = {}
; Timeout for service health checks in seconds
health_timeout_secs = {}
; Known server cap on object id queries. When an ids response has exactly
; this many ids, the fetch falls back to offset paging. 0 = uncapped
ids_query_cap = {}

[safety]
; Feature count thresholds for a single layer download
warn_feature_count = {}
block_feature_count = {}
; Filter area thresholds in square degrees
warn_extent_sq_deg = {}
block_extent_sq_deg = {}
; Feature count thresholds for high-density layers
dense_warn_feature_count = {}
dense_block_feature_count = {}
; Average output bytes per feature, used for the size estimate
est_bytes_per_feature = {}
; Estimated output size that triggers a warning (MB)
warn_file_size_mb = {}
; Timeout for the pre-flight count query in seconds
count_timeout_secs = {}
; Comma-separated layer categories that use the dense thresholds
high_density_layers = {}

[registry]
; Region registry JSON file. Empty uses ~/.geograb/regions.json
path = {}

[logging]
; Log file location
file = {}
"#,
        config.fetch.batch_size,
        config.fetch.max_concurrent_batches,
        config.fetch.max_retries,
        config.fetch.retry_base_delay_ms,
        config.fetch.request_timeout_secs,
        config.fetch.health_timeout_secs,
        config.fetch.ids_query_cap,
        config.safety.warn_feature_count,
        config.safety.block_feature_count,
        config.safety.warn_extent_sq_deg,
        config.safety.block_extent_sq_deg,
        config.safety.dense_warn_feature_count,
        config.safety.dense_block_feature_count,
        config.safety.est_bytes_per_feature,
        config.safety.warn_file_size_mb,
        config.safety.count_timeout_secs,
        config.safety.high_density_layers.join(","),
        registry_path,
        path_to_string(&config.logging.file),
    )
}

/// Flatten a `ConfigFile` into `section.key = value` pairs.
pub(super) fn to_entries(config: &ConfigFile) -> Vec<(String, String)> {
    let f = &config.fetch;
    let s = &config.safety;
    let entries: [(&str, String); 19] = [
        ("fetch.batch_size", f.batch_size.to_string()),
        ("fetch.max_concurrent_batches", f.max_concurrent_batches.to_string()),
        ("fetch.max_retries", f.max_retries.to_string()),
        ("fetch.retry_base_delay_ms", f.retry_base_delay_ms.to_string()),
        ("fetch.request_timeout_secs", f.request_timeout_secs.to_string()),
        ("fetch.health_timeout_secs", f.health_timeout_secs.to_string()),
        ("fetch.ids_query_cap", f.ids_query_cap.to_string()),
        ("safety.warn_feature_count", s.warn_feature_count.to_string()),
        ("safety.block_feature_count", s.block_feature_count.to_string()),
        ("safety.warn_extent_sq_deg", s.warn_extent_sq_deg.to_string()),
        ("safety.block_extent_sq_deg", s.block_extent_sq_deg.to_string()),
        ("safety.dense_warn_feature_count", s.dense_warn_feature_count.to_string()),
        ("safety.dense_block_feature_count", s.dense_block_feature_count.to_string()),
        ("safety.est_bytes_per_feature", s.est_bytes_per_feature.to_string()),
        ("safety.warn_file_size_mb", s.warn_file_size_mb.to_string()),
        ("safety.count_timeout_secs", s.count_timeout_secs.to_string()),
        ("safety.high_density_layers", s.high_density_layers.join(",")),
        (
            "registry.path",
            config
                .registry
                .path
                .as_ref()
                .map(|p| path_to_string(p))
                .unwrap_or_default(),
        ),
        ("logging.file", path_to_string(&config.logging.file)),
    ];
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Convert a path to a string, replacing home directory with ~.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
