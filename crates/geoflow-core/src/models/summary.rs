use serde::{Deserialize, Serialize};

use crate::models::{TaskId, TaskRecord, TaskStatus};

/// Snapshot of one task as recorded in a workflow's final result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub task_type: String,
    pub output: Option<serde_json::Value>,
    pub status: TaskStatus,
}

impl From<&TaskRecord> for TaskSummary {
    fn from(task: &TaskRecord) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type.clone(),
            output: task.output.clone(),
            status: task.status,
        }
    }
}
