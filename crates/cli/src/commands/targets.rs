//! Published target file inspection

use anyhow::{Context, Result};
use ecs_sd_lib::target::read_targets;
use ecs_sd_lib::task::{CONTAINER_NAME_LABEL, JOB_LABEL, METRICS_PATH_LABEL, TASK_ID_LABEL};
use ecs_sd_lib::ScrapeTarget;
use std::path::Path;
use tabled::Tabled;

use crate::output::{or_dash, print_json, print_table, OutputFormat};

/// Row for the targets table
#[derive(Tabled)]
pub struct TargetRow {
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Job")]
    pub job: String,
    #[tabled(rename = "Path")]
    pub metrics_path: String,
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "Task")]
    pub task_id: String,
}

impl From<&ScrapeTarget> for TargetRow {
    fn from(target: &ScrapeTarget) -> Self {
        Self {
            address: target.address().to_string(),
            job: or_dash(target.labels.get(JOB_LABEL)),
            metrics_path: or_dash(target.labels.get(METRICS_PATH_LABEL)),
            container: or_dash(target.labels.get(CONTAINER_NAME_LABEL)),
            task_id: or_dash(target.labels.get(TASK_ID_LABEL)),
        }
    }
}

/// Keep only targets whose `job` label equals `job`
pub fn filter_by_job(targets: Vec<ScrapeTarget>, job: Option<&str>) -> Vec<ScrapeTarget> {
    match job {
        Some(job) => targets
            .into_iter()
            .filter(|t| t.labels.get(JOB_LABEL).map(String::as_str) == Some(job))
            .collect(),
        None => targets,
    }
}

/// Print the targets of a published result file
pub fn show_targets(path: &Path, job: Option<&str>, format: OutputFormat) -> Result<()> {
    let targets = read_targets(path)
        .with_context(|| format!("Failed to read target file {}", path.display()))?;
    let targets = filter_by_job(targets, job);

    print_targets(&targets, format)
}

pub fn print_targets(targets: &[ScrapeTarget], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(targets)?,
        OutputFormat::Table => {
            let rows: Vec<TargetRow> = targets.iter().map(TargetRow::from).collect();
            print_table(&rows);
            if !rows.is_empty() {
                println!("\nTotal: {} targets", rows.len());
            }
        }
    }
    Ok(())
}
