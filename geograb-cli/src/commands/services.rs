//! Services command - services available for a registry region.

use geograb::region::{Registry, ServiceEntry};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the services command.
pub struct ServicesArgs {
    pub region: Option<String>,
    pub health: bool,
    pub json: bool,
}

/// Run the services command.
pub fn run(runner: &CliRunner, args: ServicesArgs) -> Result<(), CliError> {
    runner.log_startup("services");
    let registry = runner.registry()?;

    let Some(region_id) = args.region else {
        list_regions(&registry);
        return Ok(());
    };

    let services = registry.service_urls(&region_id)?;
    if args.json {
        let text = serde_json::to_string_pretty(&services)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    let name = registry
        .region(&region_id)
        .map(|r| r.name.as_str())
        .unwrap_or(region_id.as_str());
    println!("{} ({} services)", name, services.len());
    println!("{}", "=".repeat(40));

    let session = if args.health {
        Some(runner.session()?)
    } else {
        None
    };

    for entry in &services {
        print_entry(entry);
        if let Some(session) = &session {
            let health = runner.block_on(session.health(&entry.url));
            if health.alive {
                println!(
                    "    ✓ {} ms, {} layer(s)",
                    health.response_ms, health.layer_count
                );
            } else {
                println!(
                    "    ✗ {}",
                    health.error.as_deref().unwrap_or("unreachable")
                );
            }
        }
    }

    if let Some(region) = registry.region(&region_id) {
        let keys: Vec<&str> = region
            .services
            .iter()
            .flat_map(|s| s.known_layers.keys().map(String::as_str))
            .collect();
        if !keys.is_empty() {
            println!();
            println!("Known layers: {}", keys.join(", "));
        }
    }
    Ok(())
}

fn list_regions(registry: &Registry) {
    println!("Regions");
    println!("=======");
    for region in registry.regions() {
        println!("  {:<24} {}", region.id, region.name);
    }
    if !registry.presets().is_empty() {
        println!();
        println!("Presets");
        println!("=======");
        for (name, keys) in registry.presets() {
            println!("  {:<24} {}", name, keys.join(", "));
        }
    }
}

fn print_entry(entry: &ServiceEntry) {
    let scope = if entry.is_statewide { " [statewide]" } else { "" };
    println!("  {} ({}){}", entry.name, entry.kind, scope);
    println!("    {}", entry.url);
}
