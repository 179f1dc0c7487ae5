//! Configuration for geograb.
//!
//! User settings live in `~/.geograb/config.ini` and are loaded into a
//! [`ConfigFile`], which converts into the runtime configuration objects
//! used by the fetch engine ([`FetchConfig`]) and the safety evaluator.
//!
//! # Example
//!
//! ```
//! use geograb::config::{ConfigFile, FetchConfig};
//!
//! let config = ConfigFile::default();
//! let fetch: FetchConfig = config.fetch_config();
//! assert_eq!(fetch.max_concurrent(), 4);
//! ```

mod defaults;
mod fetch;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use fetch::FetchConfig;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, FetchSettings, LoggingSettings, RegistrySettings, SafetySettings};
