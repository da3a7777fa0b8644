use super::Stage;
use crate::error::Result;
use crate::rules::DiscoveryRules;
use crate::task::TaskRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Flags tasks with a container carrying the configured port label
pub struct LabelRuleStage {
    rules: Arc<DiscoveryRules>,
}

impl LabelRuleStage {
    pub fn new(rules: Arc<DiscoveryRules>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Stage for LabelRuleStage {
    async fn process(
        &mut self,
        _cluster: &str,
        mut records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        let Some(rule) = &self.rules.label else {
            return Ok(records);
        };

        for record in records.iter_mut() {
            let matched = record
                .definition
                .as_ref()
                .map_or(false, |d| d.container_definitions.iter().any(|c| rule.matches(c)));
            if matched {
                record.label_matched = true;
            }
        }

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "LabelRuleStage"
    }
}
