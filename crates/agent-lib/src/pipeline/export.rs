use super::Stage;
use crate::error::Result;
use crate::rules::DiscoveryRules;
use crate::stats::{ProcessorStats, StatKind};
use crate::target::{publish_targets, TargetSet};
use crate::task::TaskRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Builds the deduplicated target list and atomically replaces the result
/// file with it
pub struct ExportStage {
    rules: Arc<DiscoveryRules>,
    result_file: PathBuf,
    stats: Arc<ProcessorStats>,
}

impl ExportStage {
    pub fn new(
        rules: Arc<DiscoveryRules>,
        result_file: PathBuf,
        stats: Arc<ProcessorStats>,
    ) -> Self {
        Self {
            rules,
            result_file,
            stats,
        }
    }

    /// Targets for the given records, in dedup-key order
    pub fn build_targets(&self, records: &[TaskRecord]) -> TargetSet {
        let mut targets = TargetSet::new();
        for record in records {
            record.export_targets(&self.rules, &mut targets);
        }
        targets
    }
}

#[async_trait]
impl Stage for ExportStage {
    async fn process(
        &mut self,
        cluster: &str,
        records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        let targets = self.build_targets(&records).into_targets();
        publish_targets(&self.result_file, &targets)?;

        self.stats.set(StatKind::DiscoveredTargets, targets.len());
        debug!(
            cluster,
            tasks = records.len(),
            targets = targets.len(),
            path = %self.result_file.display(),
            "Exported scrape targets"
        );
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "ExportStage"
    }
}
