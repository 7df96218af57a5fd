use serde_json::json;

use crate::jobs::{Job, JobContext, JobResult};
use crate::models::TaskStatus;

pub const REPORT_GENERATION: &str = "report_generation";

/// Collects the outputs of every other task in the workflow into one report.
pub struct ReportGenerationJob;

impl Job for ReportGenerationJob {
    fn execute(&self, context: &JobContext<'_>) -> JobResult<serde_json::Value> {
        let tasks = context.workflow_tasks()?;

        let entries: Vec<serde_json::Value> = tasks
            .iter()
            .filter(|task| task.task_type != REPORT_GENERATION)
            .map(|task| {
                let error = (task.status == TaskStatus::Failed)
                    .then(|| format!("task {} failed", task.id));
                json!({
                    "taskId": task.id,
                    "taskType": task.task_type,
                    "status": task.status,
                    "output": task.output,
                    "error": error,
                })
            })
            .collect();

        Ok(json!({
            "workflowId": context.task().workflow_id,
            "tasks": entries,
            "finalReport": "Aggregated data and results",
        }))
    }
}
