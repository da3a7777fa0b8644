//! Compiled discovery rules
//!
//! Patterns and port lists are compiled once when the pipeline is built and
//! shared read-only by every stage. An invalid pattern fails the build, not
//! a tick.

use crate::config::{DiscoveryConfig, DockerLabelConfig, ServiceNameConfig, TaskDefinitionConfig};
use crate::error::{DiscoveryError, Result};
use crate::models::ContainerDefinition;
use regex::Regex;

/// Metrics path assumed by the scraper when none is configured
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Container labels with keys matching this are copied onto targets
pub const LABEL_NAME_PATTERN: &str = "^[a-zA-Z_][a-zA-Z0-9_]*$";

/// Parse a semicolon separated port list, skipping malformed entries
pub fn parse_port_list(ports: &str) -> Vec<i32> {
    ports
        .split(';')
        .filter_map(|token| token.trim().parse::<u16>().ok())
        .map(i32::from)
        .collect()
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| DiscoveryError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_optional(pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        Ok(None)
    } else {
        compile(pattern).map(Some)
    }
}

/// Label-based rule: the port, job and path come from container labels
#[derive(Debug, Clone)]
pub struct LabelRule {
    pub port_label: String,
    pub job_name_label: String,
    pub metrics_path_label: String,
}

impl From<&DockerLabelConfig> for LabelRule {
    fn from(config: &DockerLabelConfig) -> Self {
        Self {
            port_label: config.port_label.clone(),
            job_name_label: config.job_name_label.clone(),
            metrics_path_label: config.metrics_path_label.clone(),
        }
    }
}

impl LabelRule {
    /// True if the container advertises an exporter port label
    pub fn matches(&self, container: &ContainerDefinition) -> bool {
        container.docker_labels.contains_key(&self.port_label)
    }
}

/// Exporter settings shared by the definition and service-name rules
#[derive(Debug, Clone)]
pub struct ExporterRule {
    pub container_name: Option<Regex>,
    pub metrics_ports: Vec<i32>,
    pub metrics_path: String,
    pub job_name: String,
}

impl ExporterRule {
    fn new(container_name_pattern: &str, ports: &str, path: &str, job: &str) -> Result<Self> {
        Ok(Self {
            container_name: compile_optional(container_name_pattern)?,
            metrics_ports: parse_port_list(ports),
            metrics_path: path.to_string(),
            job_name: job.to_string(),
        })
    }

    /// True if no container constraint is set or the name satisfies it
    pub fn matches_container(&self, name: &str) -> bool {
        self.container_name
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(name))
    }

    /// True if any of the definition's containers satisfies the constraint
    pub fn matches_any_container(&self, containers: &[ContainerDefinition]) -> bool {
        match &self.container_name {
            None => true,
            Some(pattern) => containers
                .iter()
                .any(|c| pattern.is_match(c.name.as_deref().unwrap_or_default())),
        }
    }

    /// Configured path, or the scraper default
    pub fn effective_metrics_path(&self) -> &str {
        if self.metrics_path.is_empty() {
            DEFAULT_METRICS_PATH
        } else {
            &self.metrics_path
        }
    }
}

/// Task-definition ARN rule
#[derive(Debug, Clone)]
pub struct DefinitionRule {
    pub arn: Regex,
    pub exporter: ExporterRule,
}

impl DefinitionRule {
    pub fn compile(config: &TaskDefinitionConfig) -> Result<Self> {
        Ok(Self {
            arn: compile(&config.arn_pattern)?,
            exporter: ExporterRule::new(
                &config.container_name_pattern,
                &config.metrics_ports,
                &config.metrics_path,
                &config.job_name,
            )?,
        })
    }
}

/// Service-name rule
#[derive(Debug, Clone)]
pub struct ServiceNameRule {
    pub service_name: Regex,
    pub exporter: ExporterRule,
}

impl ServiceNameRule {
    pub fn compile(config: &ServiceNameConfig) -> Result<Self> {
        Ok(Self {
            service_name: compile(&config.service_name_pattern)?,
            exporter: ExporterRule::new(
                &config.container_name_pattern,
                &config.metrics_ports,
                &config.metrics_path,
                &config.job_name,
            )?,
        })
    }
}

/// All rule families, compiled
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    pub label: Option<LabelRule>,
    pub definitions: Vec<DefinitionRule>,
    pub services: Vec<ServiceNameRule>,
    pub label_name: Regex,
}

impl DiscoveryRules {
    pub fn compile(config: &DiscoveryConfig) -> Result<Self> {
        let definitions = config
            .task_definitions
            .iter()
            .map(DefinitionRule::compile)
            .collect::<Result<Vec<_>>>()?;

        let services = config
            .service_names
            .iter()
            .map(ServiceNameRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            label: config.docker_label.as_ref().map(LabelRule::from),
            definitions,
            services,
            label_name: compile(LABEL_NAME_PATTERN)?,
        })
    }

    /// True if no rule family is configured
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.definitions.is_empty() && self.services.is_empty()
    }
}
