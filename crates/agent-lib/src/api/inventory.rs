//! In-memory cluster inventory
//!
//! Serves the [`EcsApi`] calls from a snapshot held in memory, with the same
//! paging and batch limits as the real APIs. Used by the tests and by the
//! agent when it is pointed at a snapshot file instead of a live account.

use super::{ApiResult, EcsApi, DESCRIBE_BATCH_SIZE, DESCRIBE_SERVICES_BATCH_SIZE};
use crate::models::{
    ContainerInstance, Described, Ec2Instance, Failure, Page, Service, Task, TaskDefinition,
};
use crate::stats::StatKind;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;

/// Default listing page size
const DEFAULT_PAGE_SIZE: usize = 100;

/// Cluster inventory as stored in a snapshot file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventorySnapshot {
    /// Cluster name the snapshot describes
    pub cluster: String,
    pub tasks: Vec<Task>,
    pub task_definitions: Vec<TaskDefinition>,
    pub services: Vec<Service>,
    pub container_instances: Vec<ContainerInstance>,
    pub instances: Vec<Ec2Instance>,
}

/// [`EcsApi`] implementation over an [`InventorySnapshot`]
pub struct StaticInventory {
    snapshot: RwLock<InventorySnapshot>,
    page_size: usize,
    failing: RwLock<HashSet<StatKind>>,
}

impl StaticInventory {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            page_size: DEFAULT_PAGE_SIZE,
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Load a JSON snapshot from disk
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read inventory snapshot {:?}", path))?;
        let snapshot: InventorySnapshot = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse inventory snapshot {:?}", path))?;
        Ok(Self::new(snapshot))
    }

    /// Use a smaller page size for listings
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Modify the snapshot in place
    pub async fn update(&self, f: impl FnOnce(&mut InventorySnapshot)) {
        let mut snapshot = self.snapshot.write().await;
        f(&mut snapshot);
    }

    /// Make every subsequent call of this kind fail
    pub async fn fail(&self, call: StatKind) {
        self.failing.write().await.insert(call);
    }

    /// Stop failing calls of this kind
    pub async fn recover(&self, call: StatKind) {
        self.failing.write().await.remove(&call);
    }

    async fn check(&self, call: StatKind, cluster: Option<&str>) -> ApiResult<()> {
        if self.failing.read().await.contains(&call) {
            return Err(anyhow!("{} is unavailable", call).into());
        }
        if let Some(cluster) = cluster {
            let snapshot = self.snapshot.read().await;
            if snapshot.cluster != cluster {
                return Err(anyhow!("ClusterNotFoundException: {}", cluster).into());
            }
        }
        Ok(())
    }

    fn page<T: Clone>(&self, items: &[T], next_token: Option<String>) -> ApiResult<Page<T>> {
        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| anyhow!("InvalidParameterException: bad token {:?}", token))?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let next_token = if end < items.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(Page {
            items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
            next_token,
        })
    }
}

fn check_batch(len: usize, limit: usize) -> ApiResult<()> {
    if len > limit {
        return Err(anyhow!(
            "InvalidParameterException: {} ids requested, at most {} allowed",
            len,
            limit
        )
        .into());
    }
    Ok(())
}

fn missing(arn: &str) -> Failure {
    Failure {
        arn: Some(arn.to_string()),
        reason: Some("MISSING".to_string()),
        detail: None,
    }
}

#[async_trait]
impl EcsApi for StaticInventory {
    async fn list_tasks(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ApiResult<Page<String>> {
        self.check(StatKind::ListTasks, Some(cluster)).await?;
        let snapshot = self.snapshot.read().await;
        let arns: Vec<String> = snapshot
            .tasks
            .iter()
            .filter_map(|t| t.task_arn.clone())
            .collect();
        self.page(&arns, next_token)
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> ApiResult<Described<Task>> {
        self.check(StatKind::DescribeTasks, Some(cluster)).await?;
        check_batch(task_arns.len(), DESCRIBE_BATCH_SIZE)?;

        let snapshot = self.snapshot.read().await;
        let mut described = Described::default();
        for arn in task_arns {
            match snapshot
                .tasks
                .iter()
                .find(|t| t.task_arn.as_deref() == Some(arn.as_str()))
            {
                Some(task) => described.items.push(task.clone()),
                None => described.failures.push(missing(arn)),
            }
        }
        Ok(described)
    }

    async fn describe_task_definition(&self, arn: &str) -> ApiResult<TaskDefinition> {
        self.check(StatKind::DescribeTaskDefinition, None).await?;
        let snapshot = self.snapshot.read().await;
        snapshot
            .task_definitions
            .iter()
            .find(|d| d.task_definition_arn.as_deref() == Some(arn))
            .cloned()
            .ok_or_else(|| {
                anyhow!("ClientException: unable to describe task definition {}", arn).into()
            })
    }

    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ApiResult<Page<String>> {
        self.check(StatKind::ListServices, Some(cluster)).await?;
        let snapshot = self.snapshot.read().await;
        let arns: Vec<String> = snapshot
            .services
            .iter()
            .filter_map(|s| s.service_arn.clone())
            .collect();
        self.page(&arns, next_token)
    }

    async fn describe_services(
        &self,
        cluster: &str,
        service_arns: &[String],
    ) -> ApiResult<Described<Service>> {
        self.check(StatKind::DescribeServices, Some(cluster)).await?;
        check_batch(service_arns.len(), DESCRIBE_SERVICES_BATCH_SIZE)?;

        let snapshot = self.snapshot.read().await;
        let mut described = Described::default();
        for arn in service_arns {
            match snapshot
                .services
                .iter()
                .find(|s| s.service_arn.as_deref() == Some(arn.as_str()))
            {
                Some(service) => described.items.push(service.clone()),
                None => described.failures.push(missing(arn)),
            }
        }
        Ok(described)
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> ApiResult<Described<ContainerInstance>> {
        self.check(StatKind::DescribeContainerInstances, Some(cluster))
            .await?;
        check_batch(arns.len(), DESCRIBE_BATCH_SIZE)?;

        let snapshot = self.snapshot.read().await;
        let mut described = Described::default();
        for arn in arns {
            match snapshot
                .container_instances
                .iter()
                .find(|ci| ci.container_instance_arn.as_deref() == Some(arn.as_str()))
            {
                Some(ci) => described.items.push(ci.clone()),
                None => described.failures.push(missing(arn)),
            }
        }
        Ok(described)
    }

    async fn describe_instances(
        &self,
        instance_ids: &[String],
        next_token: Option<String>,
    ) -> ApiResult<Page<Ec2Instance>> {
        self.check(StatKind::DescribeInstances, None).await?;
        check_batch(instance_ids.len(), DESCRIBE_BATCH_SIZE)?;

        let snapshot = self.snapshot.read().await;
        let matched: Vec<Ec2Instance> = snapshot
            .instances
            .iter()
            .filter(|i| {
                i.instance_id
                    .as_ref()
                    .map_or(false, |id| instance_ids.contains(id))
            })
            .cloned()
            .collect();
        self.page(&matched, next_token)
    }
}
