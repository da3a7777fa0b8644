//! Inventory data models returned by the orchestrator APIs
//!
//! Field names follow the orchestrator's JSON shapes (camelCase) so an
//! inventory snapshot can be deserialized directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attachment type carrying the task's elastic network interface
pub const ENI_ATTACHMENT_TYPE: &str = "ElasticNetworkInterface";
/// Attachment detail holding the interface's private address
pub const PRIVATE_IPV4_DETAIL: &str = "privateIPv4Address";

/// Placement mode of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LaunchType {
    /// Runs on a container instance from the cluster's host pool
    Ec2,
    /// Serverless placement, no container instance
    Fargate,
    /// Registered external host
    External,
}

impl LaunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchType::Ec2 => "EC2",
            LaunchType::Fargate => "FARGATE",
            LaunchType::External => "EXTERNAL",
        }
    }
}

/// Task networking mode; an absent mode behaves like `Bridge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    None,
    Awsvpc,
    Host,
    Bridge,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValuePair {
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub attachment_type: Option<String>,
    pub status: Option<String>,
    pub details: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkBinding {
    pub bind_ip: Option<String>,
    pub container_port: Option<i32>,
    pub host_port: Option<i32>,
}

/// Live container inside a running task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub container_arn: Option<String>,
    pub name: Option<String>,
    pub network_bindings: Vec<NetworkBinding>,
}

/// A running task as returned by describe-tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub task_arn: Option<String>,
    pub task_definition_arn: Option<String>,
    pub container_instance_arn: Option<String>,
    pub launch_type: Option<LaunchType>,
    pub group: Option<String>,
    pub started_by: Option<String>,
    pub last_status: Option<String>,
    pub attachments: Vec<Attachment>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortMapping {
    pub container_port: Option<i32>,
    pub host_port: Option<i32>,
}

/// Container template inside a task definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerDefinition {
    pub name: Option<String>,
    pub docker_labels: BTreeMap<String, String>,
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskDefinition {
    pub task_definition_arn: Option<String>,
    pub family: Option<String>,
    pub revision: i32,
    pub network_mode: Option<NetworkMode>,
    pub container_definitions: Vec<ContainerDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    pub id: Option<String>,
    pub status: Option<String>,
}

impl Deployment {
    /// Only the active and primary deployments own running tasks
    pub fn is_current(&self) -> bool {
        matches!(self.status.as_deref(), Some("ACTIVE") | Some("PRIMARY"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub service_arn: Option<String>,
    pub service_name: Option<String>,
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerInstance {
    pub container_instance_arn: Option<String>,
    pub ec2_instance_id: Option<String>,
}

/// Compute instance backing a container instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ec2Instance {
    pub instance_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub instance_type: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
}

/// Per-item failure reported alongside a successful describe call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Failure {
    pub arn: Option<String>,
    pub reason: Option<String>,
    pub detail: Option<String>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Result of a batched describe call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Described<T> {
    pub items: Vec<T>,
    pub failures: Vec<Failure>,
}
