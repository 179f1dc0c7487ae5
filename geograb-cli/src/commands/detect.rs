//! Detect command - which registry region a location belongs to.

use geograb::coord::{BoundingBox, BuiltinTransform};
use geograb::region::{DetectionContext, RegionDetector, DEFAULT_MIN_OVERLAP};

use super::common::parse_crs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the detect command.
pub struct DetectArgs {
    pub point: Option<String>,
    pub bbox: Option<String>,
    pub crs: String,
    pub min_overlap: Option<f64>,
    pub json: bool,
}

/// Run the detect command.
pub fn run(runner: &CliRunner, args: DetectArgs) -> Result<(), CliError> {
    runner.log_startup("detect");
    let registry = runner.registry()?;
    let crs = parse_crs(&args.crs)?;

    let mut context = DetectionContext {
        crs,
        point: None,
        extent: None,
    };
    if let Some(point) = &args.point {
        context.point = Some(parse_point(point)?);
    }
    if let Some(bbox) = &args.bbox {
        let bbox =
            BoundingBox::parse(bbox).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        context = context.with_extent(bbox);
    }
    if context.point.is_none() && context.extent.is_none() {
        return Err(CliError::InvalidArgument(
            "Pass --point x,y or --bbox xmin,ymin,xmax,ymax".to_string(),
        ));
    }

    let detector = RegionDetector::new(&registry, &BuiltinTransform)
        .with_min_overlap(args.min_overlap.unwrap_or(DEFAULT_MIN_OVERLAP));

    let Some(result) = detector.detect(&context) else {
        if args.json {
            println!("null");
        } else {
            println!("No region matched.");
        }
        return Ok(());
    };

    if args.json {
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Region:     {} ({})", result.region_name, result.region);
    println!("Confidence: {}", result.confidence);
    println!("Method:     {}", result.method);
    if !result.alternates.is_empty() {
        println!();
        println!("Also matched:");
        for candidate in &result.alternates {
            println!("  {} ({})", candidate.name, candidate.region);
        }
    }
    Ok(())
}

fn parse_point(s: &str) -> Result<(f64, f64), CliError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [x, y] => match (x.parse::<f64>(), y.parse::<f64>()) {
            (Ok(x), Ok(y)) => Ok((x, y)),
            _ => Err(invalid_point(s)),
        },
        _ => Err(invalid_point(s)),
    }
}

fn invalid_point(s: &str) -> CliError {
    CliError::InvalidArgument(format!("Invalid point '{}': expected x,y", s))
}
