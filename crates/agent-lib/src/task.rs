//! Task records flowing through the discovery pipeline
//!
//! A [`TaskRecord`] starts as a raw task from the inventory stage and is
//! enriched in place by later stages. The export helpers at the bottom turn
//! a fully resolved record into scrape targets.

use crate::models::{
    ContainerDefinition, LaunchType, NetworkMode, Task, TaskDefinition, ENI_ATTACHMENT_TYPE,
    PRIVATE_IPV4_DETAIL,
};
use crate::rules::{DiscoveryRules, ExporterRule, LabelRule, DEFAULT_METRICS_PATH};
use crate::target::{ScrapeTarget, TargetSet};
use std::collections::BTreeMap;
use std::fmt;

pub const CONTAINER_NAME_LABEL: &str = "container_name";
pub const SERVICE_NAME_LABEL: &str = "ServiceName";
pub const TASK_FAMILY_LABEL: &str = "TaskDefinitionFamily";
pub const TASK_REVISION_LABEL: &str = "TaskRevision";
pub const TASK_GROUP_LABEL: &str = "TaskGroup";
pub const TASK_STARTED_BY_LABEL: &str = "StartedBy";
pub const TASK_LAUNCH_TYPE_LABEL: &str = "LaunchType";
pub const TASK_CLUSTER_NAME_LABEL: &str = "TaskClusterName";
pub const TASK_ID_LABEL: &str = "TaskId";
pub const INSTANCE_TYPE_LABEL: &str = "InstanceType";
pub const VPC_ID_LABEL: &str = "VpcId";
pub const SUBNET_ID_LABEL: &str = "SubnetId";
pub const JOB_LABEL: &str = "job";
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";

/// Network metadata of the container instance hosting a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    pub container_instance_arn: String,
    pub ec2_instance_id: String,
    pub private_ip: String,
    pub instance_type: String,
    pub subnet_id: String,
    pub vpc_id: String,
}

/// A running task plus everything the pipeline has resolved about it
#[derive(Debug, Clone, Default)]
pub struct TaskRecord {
    pub task: Task,
    pub definition: Option<TaskDefinition>,
    pub host: Option<HostInfo>,
    /// Owning service name, empty until resolved
    pub service_name: String,
    pub label_matched: bool,
    pub definition_matched: bool,
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task={} definition={} host={:?} service={:?} label_matched={} definition_matched={}",
            self.task.task_arn.as_deref().unwrap_or_default(),
            self.task.task_definition_arn.as_deref().unwrap_or_default(),
            self.host.as_ref().map(|h| h.private_ip.as_str()),
            self.service_name,
            self.label_matched,
            self.definition_matched,
        )
    }
}

/// Cluster name and task id parsed from a task ARN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskArnParts {
    pub cluster_name: Option<String>,
    pub task_id: String,
}

/// Parse `arn:<partition>:ecs:<region>:<account>:task/[<cluster>/]<id>`
pub fn parse_task_arn(arn: &str) -> Option<TaskArnParts> {
    let mut sections = arn.splitn(6, ':');
    if sections.next()? != "arn" {
        return None;
    }
    let resource = sections.nth(4)?;

    let parts: Vec<&str> = resource.split('/').skip(1).collect();
    match parts.as_slice() {
        [task_id] => Some(TaskArnParts {
            cluster_name: None,
            task_id: task_id.to_string(),
        }),
        [cluster_name, task_id] => Some(TaskArnParts {
            cluster_name: Some(cluster_name.to_string()),
            task_id: task_id.to_string(),
        }),
        _ => None,
    }
}

fn add_label(labels: &mut BTreeMap<String, String>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        labels.insert(key.to_string(), value.to_string());
    }
}

impl TaskRecord {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            ..Default::default()
        }
    }

    pub fn task_arn(&self) -> &str {
        self.task.task_arn.as_deref().unwrap_or_default()
    }

    pub fn definition_arn(&self) -> &str {
        self.task.task_definition_arn.as_deref().unwrap_or_default()
    }

    /// True if the task runs on a container instance that needs host lookup
    pub fn is_host_placed(&self) -> bool {
        self.task.launch_type == Some(LaunchType::Ec2)
    }

    fn network_mode(&self) -> Option<NetworkMode> {
        self.definition.as_ref().and_then(|d| d.network_mode)
    }

    fn containers(&self) -> &[ContainerDefinition] {
        self.definition
            .as_ref()
            .map(|d| d.container_definitions.as_slice())
            .unwrap_or_default()
    }

    /// Address the task's exporters are reachable on.
    ///
    /// `awsvpc` tasks use their network interface address only; `bridge`,
    /// `host` and unspecified modes use the container instance address.
    pub fn private_ip(&self) -> Option<&str> {
        let ip = match self.network_mode() {
            Some(NetworkMode::None) => None,
            Some(NetworkMode::Awsvpc) => self
                .task
                .attachments
                .iter()
                .filter(|a| a.attachment_type.as_deref() == Some(ENI_ATTACHMENT_TYPE))
                .flat_map(|a| a.details.iter())
                .find(|d| d.name.as_deref() == Some(PRIVATE_IPV4_DETAIL))
                .and_then(|d| d.value.as_deref()),
            Some(NetworkMode::Host) | Some(NetworkMode::Bridge) | None => {
                self.host.as_ref().map(|h| h.private_ip.as_str())
            }
        };
        ip.filter(|ip| !ip.is_empty())
    }

    /// Host port the exporter on `configured_port` is reachable on, or 0
    pub fn exporter_port(&self, configured_port: i32, container: &ContainerDefinition) -> i32 {
        match self.network_mode() {
            Some(NetworkMode::None) => 0,
            Some(NetworkMode::Awsvpc) | Some(NetworkMode::Host) => container
                .port_mappings
                .iter()
                .filter(|m| m.container_port == Some(configured_port))
                .filter_map(|m| m.host_port)
                .last()
                .unwrap_or(0),
            Some(NetworkMode::Bridge) | None => {
                let name = container.name.as_deref();
                self.task
                    .containers
                    .iter()
                    .filter(|c| c.name.as_deref() == name)
                    .flat_map(|c| c.network_bindings.iter())
                    .filter(|b| b.container_port == Some(configured_port))
                    .filter_map(|b| b.host_port)
                    .last()
                    .unwrap_or(0)
            }
        }
    }

    /// Identity labels plus matching container labels, with the job
    /// override applied last so it beats a container label named `job`
    fn target_labels(
        &self,
        rules: &DiscoveryRules,
        container: &ContainerDefinition,
        metrics_path: &str,
        job_name: &str,
    ) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        add_label(&mut labels, CONTAINER_NAME_LABEL, container.name.as_deref());

        if let Some(definition) = &self.definition {
            add_label(&mut labels, TASK_FAMILY_LABEL, definition.family.as_deref());
            add_label(
                &mut labels,
                TASK_REVISION_LABEL,
                Some(&definition.revision.to_string()),
            );
        }
        add_label(&mut labels, TASK_GROUP_LABEL, self.task.group.as_deref());
        add_label(&mut labels, TASK_STARTED_BY_LABEL, self.task.started_by.as_deref());
        add_label(
            &mut labels,
            TASK_LAUNCH_TYPE_LABEL,
            self.task.launch_type.map(|l| l.as_str()),
        );

        if let Some(parts) = parse_task_arn(self.task_arn()) {
            add_label(&mut labels, TASK_CLUSTER_NAME_LABEL, parts.cluster_name.as_deref());
            add_label(&mut labels, TASK_ID_LABEL, Some(&parts.task_id));
        }

        if let Some(host) = &self.host {
            add_label(&mut labels, INSTANCE_TYPE_LABEL, Some(&host.instance_type));
            add_label(&mut labels, VPC_ID_LABEL, Some(&host.vpc_id));
            add_label(&mut labels, SUBNET_ID_LABEL, Some(&host.subnet_id));
        }

        add_label(&mut labels, METRICS_PATH_LABEL, Some(metrics_path));
        for (key, value) in &container.docker_labels {
            if rules.label_name.is_match(key) {
                add_label(&mut labels, key, Some(value));
            }
        }
        add_label(&mut labels, JOB_LABEL, Some(job_name));

        labels
    }

    fn export_service_targets(
        &self,
        rules: &DiscoveryRules,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetSet,
    ) {
        if self.service_name.is_empty() {
            return;
        }

        let name = container.name.as_deref().unwrap_or_default();
        for rule in &rules.services {
            if !rule.service_name.is_match(&self.service_name)
                || !rule.exporter.matches_container(name)
            {
                continue;
            }
            self.export_rule_ports(rules, &rule.exporter, ip, container, targets, |labels| {
                labels.insert(SERVICE_NAME_LABEL.to_string(), self.service_name.clone());
            });
        }
    }

    fn export_label_target(
        &self,
        rules: &DiscoveryRules,
        rule: &LabelRule,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetSet,
    ) {
        if !self.label_matched {
            return;
        }

        let Some(port_value) = container.docker_labels.get(&rule.port_label) else {
            return;
        };
        let Ok(configured_port) = port_value.trim().parse::<u16>() else {
            return;
        };

        let mapped_port = self.exporter_port(i32::from(configured_port), container);
        if mapped_port == 0 {
            return;
        }

        let metrics_path = container
            .docker_labels
            .get(&rule.metrics_path_label)
            .filter(|_| !rule.metrics_path_label.is_empty())
            .map(String::as_str)
            .unwrap_or(DEFAULT_METRICS_PATH);

        let address = format!("{}:{}", ip, mapped_port);
        let key = TargetSet::key(&address, metrics_path);
        if targets.contains(&key) {
            return;
        }

        let job_name = container
            .docker_labels
            .get(&rule.job_name_label)
            .filter(|_| !rule.job_name_label.is_empty())
            .map(String::as_str)
            .unwrap_or_default();

        let labels = self.target_labels(rules, container, metrics_path, job_name);
        targets.insert(key, ScrapeTarget::new(address, labels));
    }

    fn export_definition_targets(
        &self,
        rules: &DiscoveryRules,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetSet,
    ) {
        if !self.definition_matched {
            return;
        }

        let name = container.name.as_deref().unwrap_or_default();
        for rule in &rules.definitions {
            if !rule.arn.is_match(self.definition_arn()) || !rule.exporter.matches_container(name) {
                continue;
            }
            self.export_rule_ports(rules, &rule.exporter, ip, container, targets, |_| {});
        }
    }

    fn export_rule_ports(
        &self,
        rules: &DiscoveryRules,
        exporter: &ExporterRule,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetSet,
        decorate: impl Fn(&mut BTreeMap<String, String>),
    ) {
        let metrics_path = exporter.effective_metrics_path();
        for &port in &exporter.metrics_ports {
            let mapped_port = self.exporter_port(port, container);
            if mapped_port == 0 {
                continue;
            }

            let address = format!("{}:{}", ip, mapped_port);
            let key = TargetSet::key(&address, metrics_path);
            if targets.contains(&key) {
                continue;
            }

            let mut labels = self.target_labels(rules, container, metrics_path, &exporter.job_name);
            decorate(&mut labels);
            targets.insert(key, ScrapeTarget::new(address, labels));
        }
    }

    /// Add this task's scrape targets to `targets`.
    ///
    /// Containers are visited in definition order; per container the
    /// service-name rules run first, then the label rule, then the
    /// definition rules. An existing key is never overwritten.
    pub fn export_targets(&self, rules: &DiscoveryRules, targets: &mut TargetSet) {
        let Some(ip) = self.private_ip() else {
            return;
        };

        for container in self.containers() {
            self.export_service_targets(rules, ip, container, targets);
            if let Some(rule) = &rules.label {
                self.export_label_target(rules, rule, ip, container, targets);
            }
            self.export_definition_targets(rules, ip, container, targets);
        }
    }
}
