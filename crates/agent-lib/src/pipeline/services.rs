use super::inventory::log_failures;
use super::Stage;
use crate::api::{EcsClient, DESCRIBE_SERVICES_BATCH_SIZE};
use crate::error::Result;
use crate::rules::DiscoveryRules;
use crate::task::TaskRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolves the owning service of each task through the service's current
/// deployments. A no-op unless service-name rules are configured.
pub struct ServiceStage {
    client: EcsClient,
    rules: Arc<DiscoveryRules>,
}

/// Short service name from a service ARN (`.../service/<cluster>/<name>`)
fn service_name_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

impl ServiceStage {
    pub fn new(client: EcsClient, rules: Arc<DiscoveryRules>) -> Self {
        Self { client, rules }
    }

    /// ARNs of services whose name matches any service-name rule
    async fn matching_services(&self, cluster: &str) -> Result<Vec<String>> {
        let mut matched = Vec::new();
        let mut next_token = None;

        loop {
            let page = self.client.list_services(cluster, next_token).await?;
            matched.extend(page.items.into_iter().filter(|arn| {
                let name = service_name_from_arn(arn);
                self.rules
                    .services
                    .iter()
                    .any(|rule| rule.service_name.is_match(name))
            }));

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(matched)
    }

    /// Deployment id to service name, for active and primary deployments
    async fn deployment_owners(
        &self,
        cluster: &str,
        service_arns: &[String],
    ) -> Result<HashMap<String, String>> {
        let mut owners = HashMap::new();

        for batch in service_arns.chunks(DESCRIBE_SERVICES_BATCH_SIZE) {
            let described = self.client.describe_services(cluster, batch).await?;
            log_failures("DescribeServices", &described.failures);

            for service in described.items {
                let Some(service_name) = service.service_name else {
                    continue;
                };
                for deployment in service.deployments.iter().filter(|d| d.is_current()) {
                    if let Some(id) = &deployment.id {
                        owners.insert(id.clone(), service_name.clone());
                    }
                }
            }
        }

        Ok(owners)
    }

    /// Re-check the service name and container constraint against the
    /// task's own definition
    fn accepts(&self, service_name: &str, record: &TaskRecord) -> bool {
        let containers = record
            .definition
            .as_ref()
            .map(|d| d.container_definitions.as_slice())
            .unwrap_or_default();

        self.rules.services.iter().any(|rule| {
            rule.service_name.is_match(service_name)
                && rule.exporter.matches_any_container(containers)
        })
    }
}

#[async_trait]
impl Stage for ServiceStage {
    async fn process(
        &mut self,
        cluster: &str,
        mut records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        if self.rules.services.is_empty() {
            return Ok(records);
        }

        let service_arns = self.matching_services(cluster).await?;
        let owners = self.deployment_owners(cluster, &service_arns).await?;

        let mut assigned = 0usize;
        for record in records.iter_mut() {
            let Some(started_by) = record.task.started_by.as_deref() else {
                continue;
            };
            let Some(service_name) = owners.get(started_by) else {
                continue;
            };
            if self.accepts(service_name, record) {
                record.service_name = service_name.clone();
                assigned += 1;
            }
        }

        debug!(
            services = service_arns.len(),
            deployments = owners.len(),
            assigned,
            "Resolved service names"
        );
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "ServiceStage"
    }
}
