//! Common types and utilities shared across CLI commands.

use std::collections::HashSet;

use clap::Args;
use geo::{Geometry, Polygon};

use geograb::coord::{BoundingBox, Crs};
use geograb::fetch::Session;
use geograb::orchestrator::{FilterSpec, LayerRequest};
use geograb::region::{resolve_layer_id, Registry};
use geograb::rest::FieldSelection;
use geograb::transport::AsyncHttpClient;

use crate::error::CliError;

/// Spatial filter selection shared by `check` and `download`.
#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Query area as xmin,ymin,xmax,ymax in --crs units
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,

    /// Reference frame of --bbox (e.g. 4326, EPSG:3857)
    #[arg(long, default_value = "4326")]
    pub crs: String,

    /// Buffer the area by this distance in --crs units, querying a polygon
    #[arg(long)]
    pub buffer: Option<f64>,

    /// Request every feature of the layer (always blocked by the safety check)
    #[arg(long, conflicts_with = "bbox")]
    pub full_dump: bool,
}

impl FilterArgs {
    pub fn to_filter_spec(&self) -> Result<FilterSpec, CliError> {
        if self.full_dump {
            return Ok(FilterSpec::FullDump);
        }
        let bbox = self.bbox.as_deref().ok_or_else(|| {
            CliError::InvalidArgument(
                "A query area is required: pass --bbox xmin,ymin,xmax,ymax".to_string(),
            )
        })?;
        let bbox = BoundingBox::parse(bbox).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        let crs = parse_crs(&self.crs)?;

        Ok(match self.buffer {
            Some(buffer) => FilterSpec::Clip {
                geometry: Geometry::Polygon(bbox_polygon(&bbox)),
                crs,
                buffer,
            },
            None => FilterSpec::Extent { bbox, crs },
        })
    }
}

pub fn parse_crs(s: &str) -> Result<Crs, CliError> {
    Crs::parse(s).map_err(|e| CliError::InvalidArgument(e.to_string()))
}

fn bbox_polygon(bbox: &BoundingBox) -> Polygon<f64> {
    geo::Rect::new(
        geo::coord! { x: bbox.min_x, y: bbox.min_y },
        geo::coord! { x: bbox.max_x, y: bbox.max_y },
    )
    .to_polygon()
}

/// Splits a layer URL (`.../MapServer/4`) into service URL and layer id.
pub fn split_layer_url(url: &str) -> Result<(String, i64), CliError> {
    let trimmed = url.trim_end_matches('/');
    let (service, id) = trimmed.rsplit_once('/').ok_or_else(|| invalid_layer_url(url))?;
    let id = id.parse::<i64>().map_err(|_| invalid_layer_url(url))?;
    if service.is_empty() {
        return Err(invalid_layer_url(url));
    }
    Ok((service.to_string(), id))
}

fn invalid_layer_url(url: &str) -> CliError {
    CliError::InvalidArgument(format!(
        "Invalid layer URL '{}': expected <service url>/<layer id>",
        url
    ))
}

/// Layer selection shared by `check` and `download`.
#[derive(Debug, Clone, Default, Args)]
pub struct LayerArgs {
    /// Layer URL (<service url>/<layer id>); repeatable
    #[arg(long = "layer", value_name = "URL")]
    pub layers: Vec<String>,

    /// Registry region for --key and --preset
    #[arg(long)]
    pub region: Option<String>,

    /// Known layer key in the region (e.g. parcels); repeatable
    #[arg(long = "key", value_name = "KEY", requires = "region")]
    pub keys: Vec<String>,

    /// Registry preset naming several layer keys (e.g. site_survey)
    #[arg(long, requires = "region")]
    pub preset: Option<String>,
}

/// Resolves the selected layers into download requests, in argument order:
/// explicit URLs, then keys, then preset keys.
///
/// Registry keys become the layer's category and output name. Keys the
/// region does not know are reported and skipped.
pub async fn resolve_layers<C: AsyncHttpClient>(
    args: &LayerArgs,
    registry: &Registry,
    session: &Session<C>,
) -> Result<Vec<LayerRequest>, CliError> {
    let mut requests = Vec::new();
    for url in &args.layers {
        let (service, id) = split_layer_url(url)?;
        requests.push(LayerRequest::new(service, id));
    }

    let mut keys: Vec<String> = args.keys.clone();
    if let Some(preset) = &args.preset {
        let preset_keys = registry.preset(preset).ok_or_else(|| {
            CliError::InvalidArgument(format!("Unknown preset '{}'", preset))
        })?;
        keys.extend(preset_keys.iter().cloned());
    }
    let mut seen = HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));

    if let Some(region) = &args.region {
        if registry.region(region).is_none() {
            return Err(CliError::InvalidArgument(format!("Unknown region '{}'", region)));
        }
        for key in &keys {
            let Some(found) = registry.find_layer(region, key) else {
                eprintln!("  ! No known '{}' layer for {}, skipping", key, region);
                continue;
            };
            match resolve_layer_id(session.client(), &found).await? {
                Some(id) => requests.push(
                    LayerRequest::new(found.service_url.clone(), id)
                        .with_category(key.clone())
                        .with_output_name(key.clone()),
                ),
                None => eprintln!(
                    "  ! '{}' not found on {}, skipping",
                    found.layer_name, found.service_name
                ),
            }
        }
    }

    if requests.is_empty() {
        return Err(CliError::InvalidArgument(
            "No layers selected: pass --layer URL, or --region with --key/--preset".to_string(),
        ));
    }
    Ok(requests)
}

/// `--fields a,b,c` into a field selection; absent means all fields.
pub fn parse_fields(fields: Option<&str>) -> FieldSelection {
    match fields {
        Some(list) => {
            let names: Vec<String> = list
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            if names.is_empty() || names.iter().any(|n| n == "*") {
                FieldSelection::All
            } else {
                FieldSelection::Only(names)
            }
        }
        None => FieldSelection::All,
    }
}
