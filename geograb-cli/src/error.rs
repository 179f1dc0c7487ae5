//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use geograb::config::ConfigFileError;
use geograb::orchestrator::DownloadError;
use geograb::region::RegistryError;
use geograb::rest::RestError;
use geograb::safety::SafetyDecision;
use geograb::transport::TransportError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to create the HTTP client
    HttpClient(TransportError),
    /// Region registry could not be loaded
    Registry(RegistryError),
    /// Bad command-line input
    InvalidArgument(String),
    /// Remote service request failed
    Service(RestError),
    /// Safety check blocked the request
    Blocked(SafetyDecision),
    /// Safety check warned and `--yes` was not given
    NeedsConfirmation(SafetyDecision),
    /// Download could not start
    Download(DownloadError),
    /// Download finished but some layers were not exported
    Incomplete { failed: usize, total: usize },
    /// Interrupted by the user
    Cancelled,
}

impl CliError {
    /// Process exit code.
    pub fn code(&self) -> i32 {
        match self {
            CliError::Blocked(_) => 2,
            CliError::NeedsConfirmation(_) => 3,
            CliError::Incomplete { .. } => 4,
            CliError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Blocked(decision) => {
                eprintln!();
                for reason in &decision.reasons {
                    eprintln!("  - {}", reason);
                }
                eprintln!();
                eprintln!("Narrow the request:");
                eprintln!("  1. Use a smaller --bbox around the project site");
                eprintln!("  2. Select fewer layers");
            }
            CliError::NeedsConfirmation(decision) => {
                eprintln!();
                eprintln!("{}", decision.confirmation_message());
                eprintln!();
                eprintln!("Re-run with --yes to proceed anyway.");
            }
            CliError::Registry(RegistryError::NotFound(path)) => {
                eprintln!();
                eprintln!("Registry file not found: {}", path.display());
                eprintln!("Set registry.path in config.ini, or remove it to use the built-in one.");
            }
            CliError::Service(RestError::Transport(_)) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. Service URL is wrong or the server is down");
                eprintln!("  2. A proxy or firewall blocks the request");
                eprintln!("  3. Try a longer fetch.request_timeout_secs in config.ini");
            }
            _ => {}
        }

        process::exit(self.code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::HttpClient(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Registry(e) => write!(f, "Failed to load region registry: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::Service(e) => write!(f, "Service request failed: {}", e),
            CliError::Blocked(decision) => write!(f, "Request blocked ({})", decision.summary()),
            CliError::NeedsConfirmation(decision) => {
                write!(f, "Confirmation required ({})", decision.summary())
            }
            CliError::Download(e) => write!(f, "Download failed: {}", e),
            CliError::Incomplete { failed, total } => {
                write!(f, "{} of {} layer(s) were not exported", failed, total)
            }
            CliError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::HttpClient(e) => Some(e),
            CliError::Registry(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Download(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        CliError::Registry(e)
    }
}

impl From<RestError> for CliError {
    fn from(e: RestError) -> Self {
        CliError::Service(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}
