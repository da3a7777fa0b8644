use super::Stage;
use crate::error::Result;
use crate::rules::DiscoveryRules;
use crate::task::TaskRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Flags tasks whose definition ARN matches a definition rule and, when the
/// rule names a container pattern, has at least one matching container
pub struct DefinitionRuleStage {
    rules: Arc<DiscoveryRules>,
}

impl DefinitionRuleStage {
    pub fn new(rules: Arc<DiscoveryRules>) -> Self {
        Self { rules }
    }

    fn matches(&self, record: &TaskRecord) -> bool {
        let Some(definition) = &record.definition else {
            return false;
        };
        let arn = record.definition_arn();

        self.rules.definitions.iter().any(|rule| {
            rule.arn.is_match(arn)
                && rule
                    .exporter
                    .matches_any_container(&definition.container_definitions)
        })
    }
}

#[async_trait]
impl Stage for DefinitionRuleStage {
    async fn process(
        &mut self,
        _cluster: &str,
        mut records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        if self.rules.definitions.is_empty() {
            return Ok(records);
        }

        for record in records.iter_mut() {
            if self.matches(record) {
                record.definition_matched = true;
            }
        }

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "DefinitionRuleStage"
    }
}
