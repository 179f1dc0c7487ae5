//! Layers command - layer listing of a map or feature service.

use geograb::rest::LayerSummary;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the layers command.
pub fn run(runner: &CliRunner, service_url: &str, json: bool) -> Result<(), CliError> {
    runner.log_startup("layers");
    let session = runner.session()?;
    let layers = runner.block_on(session.client().service_layers(service_url))?;

    if json {
        let text = serde_json::to_string_pretty(&layers)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{} ({} layers)", service_url, layers.len());
    for layer in layers.iter().filter(|l| l.parent_layer_id.map_or(true, |p| p < 0)) {
        print_tree(&layers, layer, 1);
    }
    Ok(())
}

fn print_tree(all: &[LayerSummary], layer: &LayerSummary, depth: usize) {
    let kind = layer.layer_type.as_deref().unwrap_or("Layer");
    let geometry = layer
        .geometry_type
        .as_deref()
        .map(|g| g.trim_start_matches("esriGeometry"))
        .unwrap_or("");
    println!(
        "{}{:>4}  {}  [{}{}{}]",
        "  ".repeat(depth),
        layer.id,
        layer.name,
        kind,
        if geometry.is_empty() { "" } else { ", " },
        geometry
    );
    for child in all.iter().filter(|l| l.parent_layer_id == Some(layer.id)) {
        print_tree(all, child, depth + 1);
    }
}
