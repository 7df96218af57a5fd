use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::{TaskId, WorkflowId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    UnknownTaskType,
    JobExecution,
    InvalidDefinition,
    WorkflowNotFound,
    TaskNotFound,
    InvalidTransition,
    InvalidInput,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub workflow: Option<WorkflowId>,
    pub task: Option<TaskId>,
    pub task_type: Option<String>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            workflow: None,
            task: None,
            task_type: None,
            kind,
            message: message.into(),
        }
    }

    pub fn workflow(mut self, workflow: WorkflowId) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Fills in attribution that a lower layer left empty.
    pub fn attribute(self, workflow: WorkflowId, task: TaskId, task_type: &str) -> Self {
        Self {
            workflow: self.workflow.or(Some(workflow)),
            task: self.task.or(Some(task)),
            task_type: self.task_type.or_else(|| Some(task_type.to_string())),
            kind: self.kind,
            message: self.message,
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for CoreError {}
