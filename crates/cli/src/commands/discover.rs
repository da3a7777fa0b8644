//! One-shot discovery against an inventory snapshot

use anyhow::{Context, Result};
use ecs_sd_agent::config::AgentConfig;
use ecs_sd_lib::target::read_targets;
use ecs_sd_lib::{DiscoveryLoop, HealthRegistry, StaticInventory};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::commands::targets::print_targets;
use crate::output::{print_info, print_success, OutputFormat};

/// Run a single discovery tick and print the published targets
///
/// `inventory` and `output` override `inventory_file` and `sd_result_file`
/// from the configuration.
pub async fn run_once(
    config_path: &Path,
    inventory: Option<PathBuf>,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let config = AgentConfig::load(config_path)?;
    let mut sd = config.service_discovery;
    if let Some(output) = output {
        sd.result_file = output;
    }

    let inventory_file = inventory
        .or(config.inventory_file)
        .context("An inventory snapshot is required (--inventory or inventory_file)")?;
    let api = StaticInventory::from_file(&inventory_file)?;
    let result_file = sd.result_file.clone();

    let mut discovery = DiscoveryLoop::new(sd, Arc::new(api), HealthRegistry::new())
        .context("Invalid service discovery configuration")?;
    let summary = discovery.tick().await.context("Discovery tick failed")?;

    if let OutputFormat::Table = format {
        print_success(&format!(
            "Discovered {} targets from {} tasks in {:?}",
            summary.targets, summary.tasks, summary.elapsed
        ));
        print_info(&format!("Published to {}", result_file.display()));
        println!();
    }

    let targets = read_targets(&result_file)?;
    print_targets(&targets, format)
}
