//! Cloud API collaborator
//!
//! The pipeline talks to the orchestrator and compute APIs only through the
//! [`EcsApi`] trait. [`EcsClient`] wraps an implementation with the per-call
//! timeout, stat accounting and error context every stage needs.

mod inventory;

pub use inventory::{InventorySnapshot, StaticInventory};

use crate::error::{ApiError, DiscoveryError, Result};
use crate::models::{ContainerInstance, Described, Ec2Instance, Page, Service, Task, TaskDefinition};
use crate::stats::{ProcessorStats, StatKind};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use async_trait::async_trait;

/// Result type returned by collaborator implementations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Maximum ids per describe-tasks, describe-container-instances and
/// describe-instances request
pub const DESCRIBE_BATCH_SIZE: usize = 100;

/// Maximum services per describe-services request
pub const DESCRIBE_SERVICES_BATCH_SIZE: usize = 10;

/// Orchestrator and compute inventory calls used by discovery
#[async_trait]
pub trait EcsApi: Send + Sync {
    /// One page of running task ARNs in the cluster
    async fn list_tasks(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ApiResult<Page<String>>;

    /// Full detail for up to [`DESCRIBE_BATCH_SIZE`] tasks
    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> ApiResult<Described<Task>>;

    async fn describe_task_definition(&self, arn: &str) -> ApiResult<TaskDefinition>;

    /// One page of service ARNs in the cluster
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ApiResult<Page<String>>;

    /// Full detail for up to [`DESCRIBE_SERVICES_BATCH_SIZE`] services
    async fn describe_services(
        &self,
        cluster: &str,
        service_arns: &[String],
    ) -> ApiResult<Described<Service>>;

    /// Full detail for up to [`DESCRIBE_BATCH_SIZE`] container instances
    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> ApiResult<Described<ContainerInstance>>;

    /// One page of compute instances for the given ids
    async fn describe_instances(
        &self,
        instance_ids: &[String],
        next_token: Option<String>,
    ) -> ApiResult<Page<Ec2Instance>>;
}

/// Shared handle used by the stages to reach the collaborator
#[derive(Clone)]
pub struct EcsClient {
    api: Arc<dyn EcsApi>,
    stats: Arc<ProcessorStats>,
    timeout: Duration,
}

impl EcsClient {
    pub fn new(api: Arc<dyn EcsApi>, stats: Arc<ProcessorStats>, timeout: Duration) -> Self {
        Self {
            api,
            stats,
            timeout,
        }
    }

    pub fn stats(&self) -> &Arc<ProcessorStats> {
        &self.stats
    }

    /// Count, bound and annotate a single remote call
    async fn call<T, F>(
        &self,
        kind: StatKind,
        context: impl FnOnce() -> String,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.stats.add(kind);
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(DiscoveryError::Api {
                context: context(),
                source,
            }),
            Err(_) => Err(DiscoveryError::Timeout {
                operation: kind.as_str(),
                timeout: self.timeout,
            }),
        }
    }

    pub async fn list_tasks(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>> {
        self.call(
            StatKind::ListTasks,
            || format!("Failed to list task ARNs for {}", cluster),
            self.api.list_tasks(cluster, next_token),
        )
        .await
    }

    pub async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Described<Task>> {
        self.call(
            StatKind::DescribeTasks,
            || format!("Failed to describe tasks for {}", cluster),
            self.api.describe_tasks(cluster, task_arns),
        )
        .await
    }

    pub async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition> {
        self.call(
            StatKind::DescribeTaskDefinition,
            || format!("Failed to describe task definition {}", arn),
            self.api.describe_task_definition(arn),
        )
        .await
    }

    pub async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>> {
        self.call(
            StatKind::ListServices,
            || format!("Failed to list service ARNs for {}", cluster),
            self.api.list_services(cluster, next_token),
        )
        .await
    }

    pub async fn describe_services(
        &self,
        cluster: &str,
        service_arns: &[String],
    ) -> Result<Described<Service>> {
        self.call(
            StatKind::DescribeServices,
            || format!("Failed to describe service ARNs for {}", cluster),
            self.api.describe_services(cluster, service_arns),
        )
        .await
    }

    pub async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Described<ContainerInstance>> {
        self.call(
            StatKind::DescribeContainerInstances,
            || format!("Failed to describe container instances for {}", cluster),
            self.api.describe_container_instances(cluster, arns),
        )
        .await
    }

    pub async fn describe_instances(
        &self,
        instance_ids: &[String],
        next_token: Option<String>,
    ) -> Result<Page<Ec2Instance>> {
        self.call(
            StatKind::DescribeInstances,
            || "Failed to describe EC2 instances".to_string(),
            self.api.describe_instances(instance_ids, next_token),
        )
        .await
    }
}
