//! The discovery pipeline
//!
//! A tick runs a fixed sequence of stages over a fresh list of task records.
//! Each stage enriches or filters the list and hands it to the next; the
//! first stage error aborts the tick and nothing is published.
//!
//! Stage order:
//! 1. [`InventoryStage`] lists and describes running tasks
//! 2. [`DefinitionStage`] attaches task definitions (cached)
//! 3. [`ServiceStage`] resolves the owning service name
//! 4. [`LabelRuleStage`] flags tasks matching the label rule
//! 5. [`DefinitionRuleStage`] flags tasks matching a definition rule
//! 6. [`FilterStage`] drops unflagged tasks
//! 7. [`HostStage`] attaches container instance metadata (cached)
//! 8. [`ExportStage`] builds, deduplicates and publishes scrape targets

mod definition_rule;
mod definitions;
mod export;
mod filter;
mod hosts;
mod inventory;
mod label_rule;
mod services;


pub use definition_rule::DefinitionRuleStage;
pub use definitions::DefinitionStage;
pub use export::ExportStage;
pub use filter::FilterStage;
pub use hosts::HostStage;
pub use inventory::InventoryStage;
pub use label_rule::LabelRuleStage;
pub use services::ServiceStage;

use crate::api::{EcsApi, EcsClient};
use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::rules::DiscoveryRules;
use crate::stats::ProcessorStats;
use crate::task::TaskRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One step of the discovery pipeline
#[async_trait]
pub trait Stage: Send {
    /// Transform the records of the current tick
    async fn process(
        &mut self,
        cluster: &str,
        records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>>;

    fn name(&self) -> &'static str;
}

/// Ordered stage list bound to one cluster
pub struct Pipeline {
    cluster: String,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Compile the rules and assemble the standard stage list.
    ///
    /// Fails on an invalid pattern or duration; the configuration is
    /// otherwise assumed to have been validated.
    pub fn new(
        config: &DiscoveryConfig,
        api: Arc<dyn EcsApi>,
        stats: Arc<ProcessorStats>,
    ) -> Result<Self> {
        let rules = Arc::new(DiscoveryRules::compile(config)?);
        let client = EcsClient::new(api, stats.clone(), config.api_timeout()?);

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(InventoryStage::new(client.clone())),
            Box::new(DefinitionStage::new(client.clone())),
            Box::new(ServiceStage::new(client.clone(), rules.clone())),
            Box::new(LabelRuleStage::new(rules.clone())),
            Box::new(DefinitionRuleStage::new(rules.clone())),
            Box::new(FilterStage),
            Box::new(HostStage::new(client)),
            Box::new(ExportStage::new(rules, config.result_file.clone(), stats)),
        ];

        Ok(Self::from_stages(config.target_cluster.clone(), stages))
    }

    /// Assemble a pipeline from an explicit stage list
    pub fn from_stages(cluster: impl Into<String>, stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            cluster: cluster.into(),
            stages,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage once, in order. Returns the records that reached
    /// the end of the pipeline.
    pub async fn run(&mut self) -> Result<Vec<TaskRecord>> {
        let mut records = Vec::new();
        for stage in self.stages.iter_mut() {
            records = stage.process(&self.cluster, records).await?;
            debug!(stage = stage.name(), records = records.len(), "Stage complete");
        }
        Ok(records)
    }
}
