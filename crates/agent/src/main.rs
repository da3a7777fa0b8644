//! ECS service discovery agent
//!
//! Polls an ECS cluster for Prometheus exporters and keeps a file-based
//! scrape target list up to date.

use anyhow::{Context, Result};
use clap::Parser;
use ecs_sd_agent::{api, config};
use ecs_sd_lib::{DiscoveryLoopBuilder, DiscoveryMetrics, HealthRegistry, StaticInventory};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "ecs-sd-agent", version, about = "ECS service discovery for Prometheus")]
struct Args {
    /// Configuration file
    #[arg(long, env = "ECS_SD_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();
    info!(version = AGENT_VERSION, config = %args.config.display(), "Starting ecs-sd-agent");

    let config = config::AgentConfig::load(&args.config)?;

    let inventory_file = config
        .inventory_file
        .as_deref()
        .context("inventory_file must be set: no live cloud API client is configured")?;
    let inventory = StaticInventory::from_file(inventory_file)?;
    info!(path = %inventory_file.display(), "Serving cluster inventory from snapshot");

    let health_registry = HealthRegistry::new();
    let metrics = DiscoveryMetrics::new();

    let discovery = DiscoveryLoopBuilder::new()
        .config(config.service_discovery.clone())
        .api(Arc::new(inventory))
        .health(health_registry.clone())
        .build()
        .map_err(|e| {
            error!(error = %e, "Invalid service discovery configuration");
            e
        })?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let discovery_handle = tokio::spawn(discovery.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(health_registry, metrics));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    discovery_handle.await?;
    if let Err(e) = api_handle.await? {
        error!(error = %e, "API server exited with an error");
    }

    info!("ecs-sd-agent stopped");
    Ok(())
}
