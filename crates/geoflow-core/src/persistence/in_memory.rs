use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::models::{
    CoreError, CoreErrorKind, ResultId, ResultRecord, TaskId, TaskRecord, WorkflowId,
    WorkflowRecord,
};
use crate::persistence::{PersistenceResult, ResultStore, TaskStore, WorkflowStore};

/// Process-local store backed by ordered maps. Used by tests and by callers
/// that do not need durability.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    workflows: BTreeMap<WorkflowId, WorkflowRecord>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    results: BTreeMap<ResultId, ResultRecord>,
    results_by_task: HashMap<TaskId, Vec<ResultId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "in-memory store mutex poisoned")
        })
    }
}

impl WorkflowStore for InMemoryStore {
    fn next_workflow_id(&self) -> PersistenceResult<u64> {
        let state = self.lock_state()?;
        Ok(next_key(state.workflows.keys().map(|id| id.0)))
    }

    fn create_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        if state.workflows.contains_key(&workflow.id) {
            return Err(storage_error(format!("workflow id '{}' already exists", workflow.id)));
        }
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    fn update_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        match state.workflows.get_mut(&workflow.id) {
            Some(existing) => {
                *existing = workflow.clone();
                Ok(())
            }
            None => Err(storage_error("workflow id was not found for update")),
        }
    }

    fn find_workflow(&self, workflow_id: WorkflowId) -> PersistenceResult<Option<WorkflowRecord>> {
        let state = self.lock_state()?;
        Ok(state.workflows.get(&workflow_id).cloned())
    }

    fn list_recent_workflows(&self, limit: usize) -> PersistenceResult<Vec<WorkflowRecord>> {
        let state = self.lock_state()?;
        Ok(state.workflows.values().rev().take(limit).cloned().collect())
    }
}

impl TaskStore for InMemoryStore {
    fn next_task_id(&self) -> PersistenceResult<u64> {
        let state = self.lock_state()?;
        Ok(next_key(state.tasks.keys().map(|id| id.0)))
    }

    fn create_tasks(&self, tasks: &[TaskRecord]) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        for task in tasks {
            if state.tasks.contains_key(&task.id) {
                return Err(storage_error(format!("task id '{}' already exists", task.id)));
            }
            if !state.workflows.contains_key(&task.workflow_id) {
                return Err(storage_error(format!(
                    "task '{}' references unknown workflow '{}'",
                    task.id, task.workflow_id
                )));
            }
        }
        for task in tasks {
            state.tasks.insert(task.id, task.clone());
        }
        Ok(())
    }

    fn update_task(&self, task: &TaskRecord) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        match state.tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(storage_error("task id was not found for update")),
        }
    }

    fn find_task(&self, task_id: TaskId) -> PersistenceResult<Option<TaskRecord>> {
        let state = self.lock_state()?;
        Ok(state.tasks.get(&task_id).cloned())
    }

    fn list_workflow_tasks(&self, workflow_id: WorkflowId) -> PersistenceResult<Vec<TaskRecord>> {
        let state = self.lock_state()?;
        let mut tasks: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|task| task.workflow_id == workflow_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| (task.step_number, task.id));
        Ok(tasks)
    }
}

impl ResultStore for InMemoryStore {
    fn next_result_id(&self) -> PersistenceResult<u64> {
        let state = self.lock_state()?;
        Ok(next_key(state.results.keys().map(|id| id.0)))
    }

    fn commit_result(
        &self,
        result: &ResultRecord,
        completed_task: &TaskRecord,
    ) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        if state.results.contains_key(&result.id) {
            return Err(storage_error(format!("result id '{}' already exists", result.id)));
        }
        let Some(existing) = state.tasks.get_mut(&completed_task.id) else {
            return Err(storage_error("task id was not found for update"));
        };
        *existing = completed_task.clone();

        state.results.insert(result.id, result.clone());
        state
            .results_by_task
            .entry(result.task_id)
            .or_default()
            .push(result.id);
        Ok(())
    }

    fn find_result(&self, result_id: ResultId) -> PersistenceResult<Option<ResultRecord>> {
        let state = self.lock_state()?;
        Ok(state.results.get(&result_id).cloned())
    }

    fn list_task_results(&self, task_id: TaskId) -> PersistenceResult<Vec<ResultRecord>> {
        let state = self.lock_state()?;
        let ids = state.results_by_task.get(&task_id);
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| state.results.get(id).cloned())
            .collect())
    }
}

fn next_key(mut keys: impl DoubleEndedIterator<Item = u64>) -> u64 {
    keys.next_back().map_or(1, |max| max.saturating_add(1))
}

fn storage_error(message: impl Into<String>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("in-memory store: {}", message.into()),
    )
}
