use super::Stage;
use crate::api::EcsClient;
use crate::cache::{LruCache, DEFAULT_CACHE_CAPACITY};
use crate::error::Result;
use crate::models::TaskDefinition;
use crate::stats::StatKind;
use crate::task::TaskRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Attaches each task's definition, fetching every distinct ARN at most
/// once per tick and caching definitions across ticks.
///
/// Records without a definition ARN are dropped. A failed fetch aborts the
/// tick.
pub struct DefinitionStage {
    client: EcsClient,
    cache: LruCache<String, TaskDefinition>,
}

impl DefinitionStage {
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

    async fn resolve(&mut self, arn: &str) -> Result<TaskDefinition> {
        if let Some(definition) = self.cache.get(arn) {
            self.client.stats().add(StatKind::TaskDefinitionCacheHit);
            return Ok(definition.clone());
        }
        self.client.stats().add(StatKind::TaskDefinitionCacheMiss);

        let definition = self.client.describe_task_definition(arn).await?;
        self.cache.put(arn.to_string(), definition.clone());
        Ok(definition)
    }
}

#[async_trait]
impl Stage for DefinitionStage {
    async fn process(
        &mut self,
        _cluster: &str,
        records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        let mut resolved: HashMap<String, TaskDefinition> = HashMap::new();
        for record in &records {
            let arn = record.definition_arn();
            if arn.is_empty() || resolved.contains_key(arn) {
                continue;
            }
            let definition = self.resolve(arn).await?;
            resolved.insert(arn.to_string(), definition);
        }

        self.client
            .stats()
            .set(StatKind::TaskDefinitionCacheSize, self.cache.len());

        let total = records.len();
        let records: Vec<TaskRecord> = records
            .into_iter()
            .filter_map(|mut record| {
                let definition = resolved.get(record.definition_arn())?.clone();
                record.definition = Some(definition);
                Some(record)
            })
            .collect();

        debug!(
            definitions = resolved.len(),
            dropped = total - records.len(),
            "Resolved task definitions"
        );
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "DefinitionStage"
    }
}
