//! Download command - fetch layers into a GeoPackage.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use geograb::coord::BuiltinTransform;
use geograb::fetch::{FetchEvent, FetchProgressCallback};
use geograb::orchestrator::{
    AutoConfirm, ConfirmationHandler, DownloadReport, DownloadRequest, Downloader, LayerOutcome,
};
use geograb::rest::Layer;
use geograb::safety::SafetyDecision;

use super::common::{parse_fields, resolve_layers, FilterArgs, LayerArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the download command.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub layers: LayerArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output GeoPackage; created if missing, layers of the same name replaced
    #[arg(short, long)]
    pub output: PathBuf,

    /// Comma-separated attribute fields to keep (default: all)
    #[arg(long)]
    pub fields: Option<String>,

    /// Proceed through safety warnings without asking
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the download command.
pub fn run(runner: &CliRunner, args: DownloadArgs) -> Result<(), CliError> {
    runner.log_startup("download");

    let registry = runner.registry()?;
    let session = runner.session()?;
    let policy = runner.config().safety_policy();
    let filter = args.filter.to_filter_spec()?;
    let cancel = runner.cancellation_token();

    let confirm: Box<dyn ConfirmationHandler> = if args.yes {
        Box::new(AutoConfirm(true))
    } else if io::stdin().is_terminal() {
        Box::new(prompt_confirmation)
    } else {
        Box::new(AutoConfirm(false))
    };

    let downloader = Downloader::new(
        &session,
        &BuiltinTransform,
        &policy,
        runner.config().fetch_config(),
    )
    .with_progress(progress_printer());

    let report = runner.block_on(async {
        let layers = resolve_layers(&args.layers, &registry, &session).await?;

        println!("Downloading {} layer(s) to {}", layers.len(), args.output.display());
        println!("{}", "=".repeat(40));

        let request = DownloadRequest {
            layers,
            filter,
            fields: parse_fields(args.fields.as_deref()),
            output: args.output.clone(),
        };
        Ok::<_, CliError>(downloader.run(&request, confirm.as_ref(), &cancel).await?)
    })?;

    print_report(&report);
    outcome_to_result(report)
}

/// Asks on the terminal whether a warned layer should still be fetched.
fn prompt_confirmation(layer: &Layer, decision: &SafetyDecision) -> bool {
    eprintln!();
    eprintln!("{}: {}", layer.name, decision.confirmation_message());
    eprint!("Proceed? [y/N] ");
    if io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn progress_printer() -> FetchProgressCallback {
    Arc::new(|event: FetchEvent| match event {
        FetchEvent::IdsResolved {
            layer,
            total,
            batches,
            ..
        } => {
            if total > 0 {
                eprintln!("  {}: {} features in {} batches", layer, total, batches);
            } else {
                eprintln!("  {}: paging by offset", layer);
            }
        }
        FetchEvent::BatchCompleted {
            layer,
            retrieved,
            total,
            ..
        } => {
            if total > 0 {
                eprint!("\r  {}: {}/{}", layer, retrieved, total);
            } else {
                eprint!("\r  {}: {}", layer, retrieved);
            }
        }
        FetchEvent::BatchRetried {
            layer,
            batch_index,
            attempt,
            reason,
        } => {
            eprintln!();
            eprintln!(
                "  {}: batch {} retry {} ({})",
                layer, batch_index, attempt, reason
            );
        }
        FetchEvent::Completed {
            layer,
            features,
            skipped,
            ..
        } => {
            eprintln!();
            if skipped > 0 {
                eprintln!("  {}: {} features, {} skipped", layer, features, skipped);
            }
        }
    })
}

fn print_report(report: &DownloadReport) {
    println!();
    println!("Results:");
    for layer in &report.layers {
        let name = layer
            .layer_name
            .clone()
            .unwrap_or_else(|| format!("{}/{}", layer.service_url, layer.layer_id));
        match &layer.outcome {
            LayerOutcome::Exported(exported) => {
                let replaced = if exported.replaced { ", replaced" } else { "" };
                println!(
                    "  ✓ {} -> {} ({} features{})",
                    name, exported.table, exported.features, replaced
                );
                for skipped in &exported.skipped {
                    println!("      skipped {}: {}", skipped.id, skipped.error);
                }
                if !exported.missing.is_empty() {
                    println!("      {} id(s) not returned by the server", exported.missing.len());
                }
            }
            LayerOutcome::Undecoded { skipped, missing } => {
                println!(
                    "  ✗ {}: nothing exported ({} skipped, {} not returned)",
                    name,
                    skipped.len(),
                    missing.len()
                );
                for skipped in skipped {
                    println!("      skipped {}: {}", skipped.id, skipped.error);
                }
            }
            LayerOutcome::Failed(e) => println!("  ✗ {}: failed ({})", name, e),
            other => {
                let summary = layer
                    .decision
                    .as_ref()
                    .map(|d| format!(" ({})", d.summary()))
                    .unwrap_or_default();
                println!("  - {}: {}{}", name, other.label(), summary);
            }
        }
    }

    let stats = &report.stats;
    println!();
    println!("Output: {}", report.output.display());
    println!(
        "Features written: {} in {:.1}s ({:.0}/s), {} batches, {} retries",
        stats.features_written,
        stats.elapsed.as_secs_f64(),
        stats.features_per_sec(),
        stats.batches,
        stats.retries
    );
}

/// Maps a finished report to the command's exit status.
///
/// A run where every unexported layer was blocked is a Block; a declined
/// warning asks for `--yes`; anything else short of full export is
/// incomplete.
fn outcome_to_result(report: DownloadReport) -> Result<(), CliError> {
    if report.was_cancelled() {
        return Err(CliError::Cancelled);
    }

    let total = report.layers.len();
    let not_exported = report
        .layers
        .iter()
        .filter(|l| !matches!(l.outcome, LayerOutcome::Exported(_) | LayerOutcome::Empty))
        .count();
    if not_exported == 0 {
        return Ok(());
    }
    let blocked = report.blocked().count();
    let nothing_exported = report.exported().next().is_none();

    let first_decision = |wanted: fn(&LayerOutcome) -> bool| {
        report
            .layers
            .iter()
            .find(|l| wanted(&l.outcome))
            .and_then(|l| l.decision.clone())
    };

    if nothing_exported && blocked == not_exported {
        if let Some(decision) = first_decision(|o| matches!(o, LayerOutcome::Blocked)) {
            return Err(CliError::Blocked(decision));
        }
    }
    if let Some(decision) = first_decision(|o| matches!(o, LayerOutcome::Declined)) {
        return Err(CliError::NeedsConfirmation(decision));
    }

    Err(CliError::Incomplete {
        failed: not_exported,
        total,
    })
}
