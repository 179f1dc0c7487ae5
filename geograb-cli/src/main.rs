//! geograb CLI - Command-line interface
//!
//! This binary provides a command-line interface to the geograb library:
//! find the services covering a site, check a request against the safety
//! limits, and download layers into a GeoPackage.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::config::ConfigCommands;
use commands::detect::DetectArgs;
use commands::download::DownloadArgs;
use commands::services::ServicesArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "geograb")]
#[command(version = geograb::VERSION)]
#[command(about = "Download ArcGIS REST feature layers into GeoPackage files", long_about = None)]
struct Cli {
    /// Enable debug-level logging
    #[arg(long, global = true)]
    debug: bool,

    /// Mirror log output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the registry region for a point or view extent
    Detect {
        /// Point as x,y in --crs units
        #[arg(long, allow_hyphen_values = true, required_unless_present = "bbox")]
        point: Option<String>,

        /// View extent as xmin,ymin,xmax,ymax in --crs units
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Reference frame of --point and --bbox
        #[arg(long, default_value = "4326")]
        crs: String,

        /// Minimum fraction of the extent a region must cover
        #[arg(long)]
        min_overlap: Option<f64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List registry regions, or the services of one region
    Services {
        /// Region id (e.g. charleston_county); omit to list regions
        region: Option<String>,

        /// Probe each service and report whether it responds
        #[arg(long)]
        health: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the services and folders of an ArcGIS REST directory
    Dir {
        /// Directory URL (e.g. https://host/arcgis/rest/services)
        url: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the layers of a MapServer or FeatureServer
    Layers {
        /// Service URL
        url: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run the pre-flight safety check without downloading
    Check(CheckArgs),

    /// Download layers into a GeoPackage
    Download(DownloadArgs),

    /// View configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        e.exit();
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    // Config commands work without logging or a runtime
    let command = match cli.command {
        Commands::Config { command } => return commands::config::run(command),
        other => other,
    };

    let runner = CliRunner::new(cli.debug, cli.verbose)?;
    match command {
        Commands::Detect {
            point,
            bbox,
            crs,
            min_overlap,
            json,
        } => commands::detect::run(
            &runner,
            DetectArgs {
                point,
                bbox,
                crs,
                min_overlap,
                json,
            },
        ),
        Commands::Services {
            region,
            health,
            json,
        } => commands::services::run(
            &runner,
            ServicesArgs {
                region,
                health,
                json,
            },
        ),
        Commands::Dir { url, json } => commands::dir::run(&runner, &url, json),
        Commands::Layers { url, json } => commands::layers::run(&runner, &url, json),
        Commands::Check(args) => commands::check::run(&runner, args),
        Commands::Download(args) => commands::download::run(&runner, args),
        Commands::Config { command } => commands::config::run(command),
    }
}
