pub mod analysis;
pub(crate) mod geojson;
pub mod notification;
pub mod polygon_area;
pub mod report_generation;

pub use analysis::AnalysisJob;
pub use notification::NotificationJob;
pub use polygon_area::PolygonAreaJob;
pub use report_generation::ReportGenerationJob;

use crate::models::{CoreError, CoreErrorKind, TaskRecord};
use crate::persistence::EngineStore;

pub type JobResult<T> = Result<T, CoreError>;

/// A unit of work bound to one task type.
///
/// Jobs only produce an output or an error. Task and workflow status belong to
/// the runner, and the context hands out no write access to storage.
pub trait Job: Send + Sync {
    fn execute(&self, context: &JobContext<'_>) -> JobResult<serde_json::Value>;
}

pub struct JobContext<'a> {
    task: &'a TaskRecord,
    store: &'a dyn EngineStore,
}

impl<'a> JobContext<'a> {
    pub fn new(task: &'a TaskRecord, store: &'a dyn EngineStore) -> Self {
        Self { task, store }
    }

    pub fn task(&self) -> &TaskRecord {
        self.task
    }

    /// Current state of every task in the owning workflow, ordered by step.
    pub fn workflow_tasks(&self) -> JobResult<Vec<TaskRecord>> {
        self.store.list_workflow_tasks(self.task.workflow_id)
    }

    pub fn failure(&self, message: impl Into<String>) -> CoreError {
        CoreError::new(CoreErrorKind::JobExecution, message)
            .workflow(self.task.workflow_id)
            .task(self.task.id)
            .task_type(self.task.task_type.as_str())
    }
}
