use super::inventory::log_failures;
use super::Stage;
use crate::api::{EcsClient, DESCRIBE_BATCH_SIZE};
use crate::cache::{LruCache, DEFAULT_CACHE_CAPACITY};
use crate::error::Result;
use crate::stats::StatKind;
use crate::task::{HostInfo, TaskRecord};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Attaches container instance metadata to tasks placed on the cluster's
/// host pool. Serverless tasks pass through untouched.
///
/// Hosts are cached by container instance ARN across ticks; only fully
/// resolved hosts are cached.
pub struct HostStage {
    client: EcsClient,
    cache: LruCache<String, HostInfo>,
}

impl HostStage {
    pub fn new(client: EcsClient) -> Self {
        Self::with_capacity(client, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(client: EcsClient, capacity: usize) -> Self {
        Self {
            client,
            cache: LruCache::new(capacity),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolve one batch of container instance ARNs into `resolved`
    async fn resolve_batch(
        &mut self,
        cluster: &str,
        batch: &[String],
        resolved: &mut HashMap<String, HostInfo>,
    ) -> Result<()> {
        let described = self.client.describe_container_instances(cluster, batch).await?;
        log_failures("DescribeContainerInstances", &described.failures);

        // EC2 instance id -> container instance ARN
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut ec2_ids = Vec::with_capacity(described.items.len());
        for instance in described.items {
            if let (Some(arn), Some(ec2_id)) =
                (instance.container_instance_arn, instance.ec2_instance_id)
            {
                ec2_ids.push(ec2_id.clone());
                owners.insert(ec2_id, arn);
            }
        }
        if ec2_ids.is_empty() {
            return Ok(());
        }

        let mut next_token = None;
        loop {
            let page = self.client.describe_instances(&ec2_ids, next_token).await?;

            for instance in page.items {
                let Some(instance_id) = instance.instance_id else {
                    continue;
                };
                let Some(arn) = owners.get(&instance_id) else {
                    continue;
                };

                let host = HostInfo {
                    container_instance_arn: arn.clone(),
                    ec2_instance_id: instance_id,
                    private_ip: instance.private_ip_address.unwrap_or_default(),
                    instance_type: instance.instance_type.unwrap_or_default(),
                    subnet_id: instance.subnet_id.unwrap_or_default(),
                    vpc_id: instance.vpc_id.unwrap_or_default(),
                };
                self.cache.put(arn.clone(), host.clone());
                resolved.insert(arn.clone(), host);
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Stage for HostStage {
    async fn process(
        &mut self,
        cluster: &str,
        mut records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        let mut resolved: HashMap<String, HostInfo> = HashMap::new();
        let mut pending: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for record in &records {
            if !record.is_host_placed() {
                continue;
            }
            let Some(arn) = record.task.container_instance_arn.as_deref() else {
                continue;
            };
            if arn.is_empty() || resolved.contains_key(arn) || seen.contains(arn) {
                continue;
            }

            match self.cache.get(arn) {
                Some(host) => {
                    self.client.stats().add(StatKind::HostCacheHit);
                    resolved.insert(arn.to_string(), host.clone());
                }
                None => {
                    self.client.stats().add(StatKind::HostCacheMiss);
                    seen.insert(arn.to_string());
                    pending.push(arn.to_string());
                }
            }
        }

        for batch in pending.chunks(DESCRIBE_BATCH_SIZE) {
            self.resolve_batch(cluster, batch, &mut resolved).await?;
        }

        for record in records.iter_mut().filter(|r| r.is_host_placed()) {
            if let Some(arn) = record.task.container_instance_arn.as_deref() {
                record.host = resolved.get(arn).cloned();
            }
        }

        self.client
            .stats()
            .set(StatKind::HostCacheSize, self.cache.len());

        debug!(
            resolved = resolved.len(),
            fetched = pending.len(),
            "Resolved container instances"
        );
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "HostStage"
    }
}
