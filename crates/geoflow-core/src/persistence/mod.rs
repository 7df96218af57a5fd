pub mod in_memory;

pub use in_memory::InMemoryStore;

use crate::models::{
    CoreError, ResultId, ResultRecord, TaskId, TaskRecord, WorkflowId, WorkflowRecord,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

pub trait WorkflowStore: Send + Sync {
    fn next_workflow_id(&self) -> PersistenceResult<u64>;

    fn create_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()>;

    fn update_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()>;

    fn find_workflow(&self, workflow_id: WorkflowId) -> PersistenceResult<Option<WorkflowRecord>>;

    fn list_recent_workflows(&self, limit: usize) -> PersistenceResult<Vec<WorkflowRecord>>;
}

pub trait TaskStore: Send + Sync {
    fn next_task_id(&self) -> PersistenceResult<u64>;

    /// Saves a batch of new tasks atomically; either every task is stored or none.
    fn create_tasks(&self, tasks: &[TaskRecord]) -> PersistenceResult<()>;

    fn update_task(&self, task: &TaskRecord) -> PersistenceResult<()>;

    fn find_task(&self, task_id: TaskId) -> PersistenceResult<Option<TaskRecord>>;

    /// Tasks of one workflow ordered by step number.
    fn list_workflow_tasks(&self, workflow_id: WorkflowId) -> PersistenceResult<Vec<TaskRecord>>;
}

pub trait ResultStore: Send + Sync {
    fn next_result_id(&self) -> PersistenceResult<u64>;

    /// Inserts `result` and saves `completed_task` in one transaction.
    fn commit_result(
        &self,
        result: &ResultRecord,
        completed_task: &TaskRecord,
    ) -> PersistenceResult<()>;

    fn find_result(&self, result_id: ResultId) -> PersistenceResult<Option<ResultRecord>>;

    fn list_task_results(&self, task_id: TaskId) -> PersistenceResult<Vec<ResultRecord>>;
}

/// Everything the builder and runner need from storage.
pub trait EngineStore: WorkflowStore + TaskStore + ResultStore {}

impl<T> EngineStore for T where T: WorkflowStore + TaskStore + ResultStore {}
