use super::Stage;
use crate::api::{EcsClient, DESCRIBE_BATCH_SIZE};
use crate::error::Result;
use crate::models::Failure;
use crate::task::TaskRecord;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Lists every running task in the cluster and describes them in batches
pub struct InventoryStage {
    client: EcsClient,
}

impl InventoryStage {
    pub fn new(client: EcsClient) -> Self {
        Self { client }
    }

    async fn list_task_arns(&self, cluster: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token = None;

        loop {
            let page = self.client.list_tasks(cluster, next_token).await?;
            arns.extend(page.items);

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(arns)
    }
}

pub(crate) fn log_failures(operation: &str, failures: &[Failure]) {
    for failure in failures {
        warn!(
            operation,
            arn = failure.arn.as_deref().unwrap_or_default(),
            reason = failure.reason.as_deref().unwrap_or_default(),
            detail = failure.detail.as_deref().unwrap_or_default(),
            "Describe call reported a failed item"
        );
    }
}

#[async_trait]
impl Stage for InventoryStage {
    async fn process(
        &mut self,
        cluster: &str,
        _records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        let arns = self.list_task_arns(cluster).await?;
        debug!(cluster, tasks = arns.len(), "Listed running tasks");

        let mut records = Vec::with_capacity(arns.len());
        for batch in arns.chunks(DESCRIBE_BATCH_SIZE) {
            let described = self.client.describe_tasks(cluster, batch).await?;
            log_failures("DescribeTasks", &described.failures);
            records.extend(described.items.into_iter().map(TaskRecord::new));
        }

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "InventoryStage"
    }
}
