//! Configuration management CLI commands.
//!
//! Provides `config path`, `config init` and `config list` for inspecting
//! `~/.geograb/config.ini` from the command line.

use clap::Subcommand;
use geograb::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Create the configuration file with default settings if missing
    Init,

    /// List all configuration settings
    List,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(),
        ConfigCommands::Init => run_init(),
        ConfigCommands::List => run_list(),
    }
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

fn run_init() -> Result<(), CliError> {
    let existed = config_file_path().exists();
    let path = ConfigFile::ensure_exists()?;
    if existed {
        println!("Configuration already exists: {}", path.display());
    } else {
        println!("✓ Created {}", path.display());
    }
    Ok(())
}

/// List all configuration settings, grouped by section.
fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = String::new();
    for (key, value) in config.entries() {
        let (section, name) = key.split_once('.').unwrap_or(("", key.as_str()));

        // Print section header when section changes
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section.to_string();
        }

        if value.is_empty() {
            println!("  {} = (not set)", name);
        } else {
            println!("  {} = {}", name, value);
        }
    }

    Ok(())
}
