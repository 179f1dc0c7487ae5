//! CLI runner for common setup and operations.
//!
//! Encapsulates logging initialization, runtime creation, and the session and
//! registry every command needs, to reduce duplication across handlers.

use std::future::Future;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use geograb::config::ConfigFile;
use geograb::fetch::Session;
use geograb::logging::{init_logging, LoggingGuard};
use geograb::region::Registry;
use geograb::rest::RestClient;
use geograb::transport::AsyncReqwestClient;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Create a new CLI runner, loading config and initializing logging.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging regardless of RUST_LOG
    /// * `verbose` - Mirror log output to stderr
    pub fn new(debug_mode: bool, verbose: bool) -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = ConfigFile::load()?;

        let logging_guard = init_logging(&config.logging.file, verbose, debug_mode)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = Runtime::new().map_err(CliError::Runtime)?;

        Ok(Self {
            logging_guard,
            config,
            runtime,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("geograb v{}", geograb::VERSION);
        info!("geograb CLI: {} command", command);
    }

    /// Session over a real HTTP client, with retry and timeouts from config.
    pub fn session(&self) -> Result<Session<AsyncReqwestClient>, CliError> {
        let fetch = self.config.fetch_config();
        let http = AsyncReqwestClient::new().map_err(CliError::HttpClient)?;
        let client = RestClient::new(http)
            .with_timeout(Some(fetch.request_timeout()))
            .with_retry(*fetch.retry());
        Ok(Session::new(client).with_health_timeout(self.config.health_timeout()))
    }

    /// Registry from `registry.path`, or the built-in one when that file
    /// does not exist.
    pub fn registry(&self) -> Result<Registry, CliError> {
        let source = self.config.registry_source();
        if let Some(path) = &source {
            info!(path = %path.display(), "Loading registry");
        }
        Ok(Registry::load_or_builtin(source.as_deref())?)
    }

    /// Run a future to completion on the runner's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Token cancelled on Ctrl-C.
    pub fn cancellation_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        self.runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after in-flight requests");
                eprintln!("\nInterrupted, finishing in-flight requests...");
                child.cancel();
            }
        });
        token
    }
}
