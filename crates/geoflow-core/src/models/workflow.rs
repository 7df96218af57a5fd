use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::models::{TaskStatus, TaskSummary};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub u64);

impl Display for WorkflowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Initial,
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Derives the workflow status from its tasks: any failure wins, then
    /// all-completed, otherwise still in progress.
    pub fn aggregate(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let mut all_completed = true;
        for status in statuses {
            if status == TaskStatus::Failed {
                return Self::Failed;
            }
            if status != TaskStatus::Completed {
                all_completed = false;
            }
        }

        if all_completed {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "initial" => Ok(Self::Initial),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub name: String,
    pub client_id: String,
    pub status: WorkflowStatus,
    pub final_result: Option<Vec<TaskSummary>>,
    pub created_at: SystemTime,
}

impl WorkflowRecord {
    pub fn initial(id: WorkflowId, name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            client_id: client_id.into(),
            status: WorkflowStatus::Initial,
            final_result: None,
            created_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_failed_task_fails_the_workflow() {
        let status = WorkflowStatus::aggregate([
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Queued,
        ]);
        assert_eq!(status, WorkflowStatus::Failed);
    }

    #[test]
    fn all_completed_tasks_complete_the_workflow() {
        let status = WorkflowStatus::aggregate([TaskStatus::Completed, TaskStatus::Completed]);
        assert_eq!(status, WorkflowStatus::Completed);
    }

    #[test]
    fn pending_tasks_keep_the_workflow_in_progress() {
        for pending in [TaskStatus::Queued, TaskStatus::InProgress] {
            let status = WorkflowStatus::aggregate([TaskStatus::Completed, pending]);
            assert_eq!(status, WorkflowStatus::InProgress);
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            WorkflowStatus::Initial,
            WorkflowStatus::InProgress,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<WorkflowStatus>(), Ok(status));
        }
    }
}
