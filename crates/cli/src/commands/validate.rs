//! Configuration validation

use anyhow::{Context, Result};
use colored::Colorize;
use ecs_sd_agent::config::AgentConfig;
use ecs_sd_lib::DiscoveryRules;
use serde::Serialize;
use std::path::Path;

use crate::output::{color_enabled, print_info, print_json, print_success, OutputFormat};

#[derive(Debug, Serialize)]
struct ValidationSummary {
    cluster: String,
    region: String,
    frequency_secs: u64,
    api_timeout_secs: u64,
    result_file: String,
    docker_label: bool,
    task_definition_rules: usize,
    service_name_rules: usize,
    inventory_file: Option<String>,
}

/// Load, validate and compile a configuration file
pub fn validate_config(path: &Path, format: OutputFormat) -> Result<()> {
    let config = AgentConfig::load(path)?;
    let sd = &config.service_discovery;

    sd.validate().context("Invalid service discovery configuration")?;
    let rules = DiscoveryRules::compile(sd).context("Invalid discovery rule pattern")?;

    let summary = ValidationSummary {
        cluster: sd.target_cluster.clone(),
        region: sd.cluster_region.clone(),
        frequency_secs: sd.frequency()?.as_secs(),
        api_timeout_secs: sd.api_timeout()?.as_secs(),
        result_file: sd.result_file.display().to_string(),
        docker_label: rules.label.is_some(),
        task_definition_rules: rules.definitions.len(),
        service_name_rules: rules.services.len(),
        inventory_file: config
            .inventory_file
            .as_ref()
            .map(|p| p.display().to_string()),
    };

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_success(&format!("{} is valid", path.display()));
            println!();
            println!("{}", "Discovery".bold());
            println!("{}", "=".repeat(50));
            println!("Cluster:                {}", summary.cluster.cyan());
            println!("Region:                 {}", summary.region.cyan());
            println!("Frequency:              {}s", summary.frequency_secs);
            println!("API timeout:            {}s", summary.api_timeout_secs);
            println!("Result file:            {}", summary.result_file);
            println!();
            println!("{}", "Rules".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Docker label:           {}",
                color_enabled(usize::from(summary.docker_label))
            );
            println!(
                "Task definition:        {}",
                color_enabled(summary.task_definition_rules)
            );
            println!(
                "Service name:           {}",
                color_enabled(summary.service_name_rules)
            );

            if let Some(inventory) = &summary.inventory_file {
                println!();
                print_info(&format!("Inventory snapshot: {}", inventory));
            }
        }
    }

    Ok(())
}
