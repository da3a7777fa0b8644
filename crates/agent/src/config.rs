//! Agent configuration
//!
//! Loaded from an optional TOML file, then overridden by `ECS_SD_*`
//! environment variables (`__` separates nested keys, e.g.
//! `ECS_SD_SERVICE_DISCOVERY__SD_FREQUENCY=30s`).

use anyhow::{Context, Result};
use ecs_sd_lib::DiscoveryConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecs-sd/config.toml";

const ENV_PREFIX: &str = "ECS_SD";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Port for the health and metrics server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Inventory snapshot served in place of a live cloud API client
    #[serde(default)]
    pub inventory_file: Option<PathBuf>,

    #[serde(default)]
    pub service_discovery: DiscoveryConfig,
}

fn default_api_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load configuration from `path` (if it exists) and the environment
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: &Path, environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Failed to parse agent configuration")
    }
}
