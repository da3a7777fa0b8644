//! Service discovery configuration
//!
//! Key names match the `ecs_service_discovery` block of the agent
//! configuration file. Validation happens once, before the discovery loop
//! starts; a configuration that fails here never reaches a tick.

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default polling frequency
pub const DEFAULT_FREQUENCY: &str = "1m";

/// Default per-call timeout for cloud API requests
pub const DEFAULT_API_TIMEOUT: &str = "30s";

/// Label-based discovery: containers advertise their exporter via labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerLabelConfig {
    /// Label whose value is the exporter's container port (required)
    #[serde(rename = "sd_port_label")]
    pub port_label: String,

    /// Label whose value overrides the `job` label
    #[serde(rename = "sd_job_name_label", default)]
    pub job_name_label: String,

    /// Label whose value overrides the metrics path
    #[serde(rename = "sd_metrics_path_label", default)]
    pub metrics_path_label: String,
}

/// Task-definition based discovery rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinitionConfig {
    #[serde(rename = "sd_task_definition_arn_pattern")]
    pub arn_pattern: String,

    #[serde(rename = "sd_container_name_pattern", default)]
    pub container_name_pattern: String,

    /// Semicolon separated container ports, e.g. `"9404;9406"`
    #[serde(rename = "sd_metrics_ports", default)]
    pub metrics_ports: String,

    #[serde(rename = "sd_metrics_path", default)]
    pub metrics_path: String,

    #[serde(rename = "sd_job_name", default)]
    pub job_name: String,
}

/// Service-name based discovery rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNameConfig {
    #[serde(rename = "sd_service_name_pattern")]
    pub service_name_pattern: String,

    #[serde(rename = "sd_container_name_pattern", default)]
    pub container_name_pattern: String,

    #[serde(rename = "sd_metrics_ports", default)]
    pub metrics_ports: String,

    #[serde(rename = "sd_metrics_path", default)]
    pub metrics_path: String,

    #[serde(rename = "sd_job_name", default)]
    pub job_name: String,
}

/// Complete discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Polling frequency as a duration string (e.g. `"30s"`)
    #[serde(rename = "sd_frequency", default = "default_frequency")]
    pub frequency: String,

    #[serde(rename = "sd_target_cluster", default)]
    pub target_cluster: String,

    #[serde(rename = "sd_cluster_region", default)]
    pub cluster_region: String,

    /// File the scrape targets are published to
    #[serde(rename = "sd_result_file", default)]
    pub result_file: PathBuf,

    /// Timeout applied to every cloud API call
    #[serde(default = "default_api_timeout")]
    pub api_timeout: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_label: Option<DockerLabelConfig>,

    #[serde(rename = "task_definition_list", default)]
    pub task_definitions: Vec<TaskDefinitionConfig>,

    #[serde(rename = "service_name_list_for_tasks", default)]
    pub service_names: Vec<ServiceNameConfig>,
}

fn default_frequency() -> String {
    DEFAULT_FREQUENCY.to_string()
}

fn default_api_timeout() -> String {
    DEFAULT_API_TIMEOUT.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            target_cluster: String::new(),
            cluster_region: String::new(),
            result_file: PathBuf::new(),
            api_timeout: default_api_timeout(),
            docker_label: None,
            task_definitions: Vec::new(),
            service_names: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Polling interval parsed from `sd_frequency`
    pub fn frequency(&self) -> Result<Duration> {
        parse_duration("sd_frequency", &self.frequency)
    }

    /// Per-call timeout parsed from `api_timeout`
    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration("api_timeout", &self.api_timeout)
    }

    /// Check the configuration before the discovery loop is started
    pub fn validate(&self) -> Result<()> {
        if self.docker_label.is_none()
            && self.task_definitions.is_empty()
            && self.service_names.is_empty()
        {
            return Err(DiscoveryError::Config(
                "neither docker label based discovery, nor task definition based discovery, \
                 nor service name based discovery is enabled"
                    .to_string(),
            ));
        }

        if self.target_cluster.trim().is_empty() || self.cluster_region.trim().is_empty() {
            return Err(DiscoveryError::Config(
                "target ECS cluster name and region must both be set".to_string(),
            ));
        }

        if self.result_file.as_os_str().is_empty() {
            return Err(DiscoveryError::Config(
                "sd_result_file must be set".to_string(),
            ));
        }

        if let Some(label) = &self.docker_label {
            if label.port_label.is_empty() {
                return Err(DiscoveryError::Config(
                    "docker_label.sd_port_label must be set".to_string(),
                ));
            }
        }

        self.frequency()?;
        self.api_timeout()?;
        Ok(())
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let duration = humantime::parse_duration(value.trim()).map_err(|e| {
        DiscoveryError::Config(format!("{} {:?} is not a valid duration: {}", key, value, e))
    })?;

    if duration.is_zero() {
        return Err(DiscoveryError::Config(format!("{} must be non-zero", key)));
    }

    Ok(duration)
}
