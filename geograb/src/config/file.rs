//! Configuration file handling for ~/.geograb/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::settings::ConfigFile;

use super::defaults::DEFAULT_RETRY_MAX_DELAY_MS;
use super::fetch::FetchConfig;
use crate::rest::RetryPolicy;
use crate::safety::SafetyPolicy;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path (~/.geograb/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path (~/.geograb/config.ini).
    pub fn save(&self) -> Result<(), ConfigFileError> {
        let path = config_file_path();
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
        }
        Ok(path)
    }

    /// All settings as `section.key = value` pairs, in file order.
    pub fn entries(&self) -> Vec<(String, String)> {
        super::writer::to_entries(self)
    }

    /// Registry file path, falling back to `regions.json` beside config.ini.
    pub fn registry_path(&self) -> PathBuf {
        self.registry
            .path
            .clone()
            .unwrap_or_else(|| config_directory().join("regions.json"))
    }

    /// Fetch engine configuration derived from the `[fetch]` section.
    pub fn fetch_config(&self) -> FetchConfig {
        let f = &self.fetch;
        let retry = RetryPolicy {
            max_attempts: f.max_retries.saturating_add(1),
            base_delay: Duration::from_millis(f.retry_base_delay_ms),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        };
        FetchConfig::default()
            .with_batch_size((f.batch_size > 0).then_some(f.batch_size))
            .with_max_concurrent(f.max_concurrent_batches)
            .with_retry(retry)
            .with_request_timeout(Duration::from_secs(f.request_timeout_secs))
            .with_ids_query_cap((f.ids_query_cap > 0).then_some(f.ids_query_cap))
    }

    /// Timeout for service health checks.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.health_timeout_secs)
    }

    /// Registry file to load, or `None` for the built-in registry.
    ///
    /// A configured path is always returned so a missing file is reported;
    /// the default location is used only when it exists.
    pub fn registry_source(&self) -> Option<PathBuf> {
        let path = self.registry_path();
        (self.registry.path.is_some() || path.exists()).then_some(path)
    }

    /// Safety policy derived from the `[safety]` section.
    pub fn safety_policy(&self) -> SafetyPolicy {
        let s = &self.safety;
        SafetyPolicy::default()
            .with_feature_limits(s.warn_feature_count, s.block_feature_count)
            .with_dense_feature_limits(s.dense_warn_feature_count, s.dense_block_feature_count)
            .with_extent_limits(s.warn_extent_sq_deg, s.block_extent_sq_deg)
            .with_bytes_per_feature(s.est_bytes_per_feature)
            .with_warn_file_size_mb(s.warn_file_size_mb)
            .with_count_timeout(Duration::from_secs(s.count_timeout_secs))
            .with_high_density_categories(s.high_density_layers.clone())
    }
}

/// Get the path to the config directory (~/.geograb).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".geograb")
}

/// Get the path to the config file (~/.geograb/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
