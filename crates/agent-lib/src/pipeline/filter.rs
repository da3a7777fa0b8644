use super::Stage;
use crate::error::Result;
use crate::task::TaskRecord;
use async_trait::async_trait;
use tracing::debug;

/// Keeps only tasks flagged by the label rule or a definition rule.
///
/// A task that only resolved a service name is dropped here, so service-name
/// rules produce targets only for tasks another rule family also matched.
pub struct FilterStage;

#[async_trait]
impl Stage for FilterStage {
    async fn process(
        &mut self,
        _cluster: &str,
        mut records: Vec<TaskRecord>,
    ) -> Result<Vec<TaskRecord>> {
        let total = records.len();
        records.retain(|r| r.label_matched || r.definition_matched);

        debug!(kept = records.len(), dropped = total - records.len(), "Filtered tasks");
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "FilterStage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label_matched: bool, definition_matched: bool, service_name: &str) -> TaskRecord {
        TaskRecord {
            label_matched,
            definition_matched,
            service_name: service_name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_keeps_flagged_records() {
        let records = vec![
            record(true, false, ""),
            record(false, true, ""),
            record(true, true, ""),
            record(false, false, ""),
        ];

        let kept = FilterStage.process("ExampleCluster", records).await.unwrap();
        assert_eq!(kept.len(), 3);
    }

    #[tokio::test]
    async fn test_drops_service_name_only_records() {
        let records = vec![record(false, false, "nginx-service")];
        let kept = FilterStage.process("ExampleCluster", records).await.unwrap();
        assert!(kept.is_empty());
    }
}
