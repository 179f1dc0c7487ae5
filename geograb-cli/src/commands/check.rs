//! Pre-flight safety check command.
//!
//! Runs the same count and extent checks a download would, without fetching
//! any features.

use clap::Args;

use geograb::coord::BuiltinTransform;
use geograb::orchestrator::Downloader;
use geograb::safety::{SafetyDecision, SafetyEvaluator, Verdict};

use super::common::{resolve_layers, FilterArgs, LayerArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the check command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub layers: LayerArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Layer category for density rules (e.g. parcels); registry keys set it
    #[arg(long)]
    pub category: Option<String>,
}

/// Run the check command.
///
/// Exits with the Block code when any layer is blocked. Warned layers are
/// reported but do not fail the check.
pub fn run(runner: &CliRunner, args: CheckArgs) -> Result<(), CliError> {
    runner.log_startup("check");

    let registry = runner.registry()?;
    let session = runner.session()?;
    let policy = runner.config().safety_policy();
    let spec = args.filter.to_filter_spec()?;

    let downloader = Downloader::new(
        &session,
        &BuiltinTransform,
        &policy,
        runner.config().fetch_config(),
    );
    let evaluator = SafetyEvaluator::new(session.client(), &policy);

    let decisions = runner.block_on(async {
        let requests = resolve_layers(&args.layers, &registry, &session).await?;

        println!("Safety Check");
        println!("{}", "=".repeat(40));
        println!();

        let mut decisions = Vec::with_capacity(requests.len());
        for request in &requests {
            let layer = session.layer(&request.service_url, request.layer_id).await?;
            let filter = downloader
                .build_filter(&spec, &layer)
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            let category = args.category.as_deref().or(request.category.as_deref());
            let decision = evaluator.evaluate(&layer, category, filter.as_ref()).await;

            println!("{} ({}/{})", layer.name, request.service_url, request.layer_id);
            println!("  {}", decision.summary());
            for reason in &decision.reasons {
                println!("  - {}", reason);
            }
            println!();
            decisions.push(decision);
        }
        Ok::<_, CliError>(decisions)
    })?;

    match strictest(decisions) {
        Some(decision) if decision.verdict == Verdict::Block => Err(CliError::Blocked(decision)),
        Some(decision) if decision.verdict == Verdict::Warn => {
            println!("{}", decision.confirmation_message());
            println!();
            println!("Downloads of warned layers need --yes.");
            Ok(())
        }
        _ => {
            println!("✓ All layers within limits");
            Ok(())
        }
    }
}

/// The first decision with the strictest verdict.
fn strictest(decisions: Vec<SafetyDecision>) -> Option<SafetyDecision> {
    decisions.into_iter().fold(None, |worst, decision| match worst {
        Some(w) if w.verdict >= decision.verdict => Some(w),
        _ => Some(decision),
    })
}
