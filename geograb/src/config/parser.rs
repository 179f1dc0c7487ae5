//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::defaults::clamp_concurrent_batches;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

const NON_NEGATIVE: &str = "must be a non-negative integer";
const POSITIVE_SECS: &str = "must be a positive integer (seconds)";
const BATCH_SIZE_REASON: &str = "must be a non-negative integer (0 = server value)";
const IDS_CAP_REASON: &str = "must be a non-negative integer (0 = uncapped)";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [fetch] section
    if let Some(section) = Section::get(ini, "fetch") {
        let f = &mut config.fetch;
        if let Some(v) = section.num("batch_size", BATCH_SIZE_REASON)? {
            f.batch_size = v;
        }
        if let Some(v) = section.num::<usize>("max_concurrent_batches", NON_NEGATIVE)? {
            f.max_concurrent_batches = clamp_concurrent_batches(v);
        }
        if let Some(v) = section.num("max_retries", NON_NEGATIVE)? {
            f.max_retries = v;
        }
        if let Some(v) = section.num("retry_base_delay_ms", NON_NEGATIVE)? {
            f.retry_base_delay_ms = v;
        }
        if let Some(v) = section.num::<u64>("request_timeout_secs", POSITIVE_SECS)? {
            if v == 0 {
                return Err(section.invalid("request_timeout_secs", "0", POSITIVE_SECS));
            }
            f.request_timeout_secs = v;
        }
        if let Some(v) = section.num::<u64>("health_timeout_secs", POSITIVE_SECS)? {
            if v == 0 {
                return Err(section.invalid("health_timeout_secs", "0", POSITIVE_SECS));
            }
            f.health_timeout_secs = v;
        }
        if let Some(v) = section.num("ids_query_cap", IDS_CAP_REASON)? {
            f.ids_query_cap = v;
        }
    }

    // [safety] section
    if let Some(section) = Section::get(ini, "safety") {
        let s = &mut config.safety;
        if let Some(v) = section.num("warn_feature_count", NON_NEGATIVE)? {
            s.warn_feature_count = v;
        }
        if let Some(v) = section.num("block_feature_count", NON_NEGATIVE)? {
            s.block_feature_count = v;
        }
        if let Some(v) = section.positive("warn_extent_sq_deg")? {
            s.warn_extent_sq_deg = v;
        }
        if let Some(v) = section.positive("block_extent_sq_deg")? {
            s.block_extent_sq_deg = v;
        }
        if let Some(v) = section.num("dense_warn_feature_count", NON_NEGATIVE)? {
            s.dense_warn_feature_count = v;
        }
        if let Some(v) = section.num("dense_block_feature_count", NON_NEGATIVE)? {
            s.dense_block_feature_count = v;
        }
        if let Some(v) = section.num("est_bytes_per_feature", NON_NEGATIVE)? {
            s.est_bytes_per_feature = v;
        }
        if let Some(v) = section.positive("warn_file_size_mb")? {
            s.warn_file_size_mb = v;
        }
        if let Some(v) = section.num::<u64>("count_timeout_secs", POSITIVE_SECS)? {
            s.count_timeout_secs = v.max(1);
        }
        if let Some(v) = section.props.get("high_density_layers") {
            s.high_density_layers = v
                .split(',')
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
        }

        if s.warn_feature_count > s.block_feature_count {
            return Err(section.invalid(
                "warn_feature_count",
                &s.warn_feature_count.to_string(),
                "must not exceed block_feature_count",
            ));
        }
        if s.dense_warn_feature_count > s.dense_block_feature_count {
            return Err(section.invalid(
                "dense_warn_feature_count",
                &s.dense_warn_feature_count.to_string(),
                "must not exceed dense_block_feature_count",
            ));
        }
        if s.warn_extent_sq_deg > s.block_extent_sq_deg {
            return Err(section.invalid(
                "warn_extent_sq_deg",
                &s.warn_extent_sq_deg.to_string(),
                "must not exceed block_extent_sq_deg",
            ));
        }
    }

    // [registry] section
    if let Some(section) = ini.section(Some("registry")) {
        if let Some(v) = section.get("path") {
            let v = v.trim();
            if !v.is_empty() {
                config.registry.path = Some(expand_tilde(v));
            }
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

/// A named INI section with typed accessors.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn get(ini: &'a Ini, name: &'static str) -> Option<Self> {
        ini.section(Some(name)).map(|props| Self { name, props })
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn num<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        match self.props.get(key) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, v, reason)),
        }
    }

    fn positive(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        const REASON: &str = "must be a positive number";
        match self.num::<f64>(key, REASON)? {
            Some(v) if !v.is_finite() || v <= 0.0 => {
                Err(self.invalid(key, &v.to_string(), REASON))
            }
            other => Ok(other),
        }
    }
}

/// Expand `~/` at the start of a path to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::config::settings::ConfigFile;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = load("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_fetch_section_overrides() {
        let config = load(
            r#"
[fetch]
batch_size = 250
max_concurrent_batches = 2
max_retries = 1
retry_base_delay_ms = 100
request_timeout_secs = 15
health_timeout_secs = 3
ids_query_cap = 1000
"#,
        )
        .unwrap();

        assert_eq!(config.fetch.batch_size, 250);
        assert_eq!(config.fetch.max_concurrent_batches, 2);
        assert_eq!(config.fetch.max_retries, 1);
        assert_eq!(config.fetch.retry_base_delay_ms, 100);
        assert_eq!(config.fetch.request_timeout_secs, 15);
        assert_eq!(config.fetch.health_timeout_secs, 3);
        assert_eq!(config.fetch.ids_query_cap, 1000);
        // Untouched sections keep defaults
        assert_eq!(config.safety.block_feature_count, DEFAULT_BLOCK_FEATURE_COUNT);
    }

    #[test]
    fn test_concurrency_is_clamped() {
        let config = load("[fetch]\nmax_concurrent_batches = 64\n").unwrap();
        assert_eq!(config.fetch.max_concurrent_batches, MAX_CONCURRENT_BATCHES);

        let config = load("[fetch]\nmax_concurrent_batches = 0\n").unwrap();
        assert_eq!(config.fetch.max_concurrent_batches, MIN_CONCURRENT_BATCHES);
    }

    #[test]
    fn test_invalid_batch_size() {
        let err = load("[fetch]\nbatch_size = lots\n").unwrap_err();
        assert!(err.to_string().contains("fetch.batch_size"));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = load("[fetch]\nrequest_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        let err = load("[fetch]\nhealth_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("health_timeout_secs"));
    }

    #[test]
    fn test_safety_section_overrides() {
        let config = load(
            r#"
[safety]
warn_feature_count = 500
block_feature_count = 5000
warn_extent_sq_deg = 0.1
block_extent_sq_deg = 1.5
high_density_layers = Parcels, wetlands ,
"#,
        )
        .unwrap();

        assert_eq!(config.safety.warn_feature_count, 500);
        assert_eq!(config.safety.block_feature_count, 5000);
        assert_eq!(config.safety.warn_extent_sq_deg, 0.1);
        assert_eq!(config.safety.block_extent_sq_deg, 1.5);
        assert_eq!(
            config.safety.high_density_layers,
            vec!["parcels".to_string(), "wetlands".to_string()]
        );
    }

    #[test]
    fn test_warn_above_block_rejected() {
        let err = load("[safety]\nwarn_feature_count = 200000\n").unwrap_err();
        assert!(err.to_string().contains("must not exceed block_feature_count"));
    }

    #[test]
    fn test_negative_extent_rejected() {
        let err = load("[safety]\nblock_extent_sq_deg = -1\n").unwrap_err();
        assert!(err.to_string().contains("positive number"));
    }

    #[test]
    fn test_registry_path_tilde_expansion() {
        let config = load("[registry]\npath = ~/gis/regions.json\n").unwrap();
        let path = config.registry.path.unwrap();
        assert!(path.ends_with("gis/regions.json"));
        assert!(!path.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_empty_registry_path_is_none() {
        let config = load("[registry]\npath =\n").unwrap();
        assert!(config.registry.path.is_none());
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/tmp/x.log"), PathBuf::from("/tmp/x.log"));
    }
}
