use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::models::{ResultId, WorkflowId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// One persisted unit of execution inside a workflow.
///
/// `depends_on` is a foreign key into the same workflow's tasks and is resolved
/// through the store, never held as an embedded record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    pub client_id: String,
    pub input: String,
    pub task_type: String,
    pub step_number: u32,
    pub status: TaskStatus,
    pub progress: Option<String>,
    pub output: Option<serde_json::Value>,
    pub result_id: Option<ResultId>,
    pub depends_on: Option<TaskId>,
    pub created_at: SystemTime,
}

impl TaskRecord {
    pub fn queued(
        id: TaskId,
        workflow_id: WorkflowId,
        client_id: impl Into<String>,
        input: impl Into<String>,
        task_type: impl Into<String>,
        step_number: u32,
    ) -> Self {
        Self {
            id,
            workflow_id,
            client_id: client_id.into(),
            input: input.into(),
            task_type: task_type.into(),
            step_number,
            status: TaskStatus::Queued,
            progress: None,
            output: None,
            result_id: None,
            depends_on: None,
            created_at: SystemTime::now(),
        }
    }

    pub fn depends_on(mut self, dependency: TaskId) -> Self {
        self.depends_on = Some(dependency);
        self
    }
}
