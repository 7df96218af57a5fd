use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::models::{
    CoreError, CoreErrorKind, TaskId, TaskRecord, WorkflowId, WorkflowRecord, WorkflowStatus,
};
use crate::persistence::EngineStore;
use crate::workflows::WorkflowDefinition;

/// A workflow together with its tasks in step order, as read back from storage.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowSnapshot {
    pub workflow: WorkflowRecord,
    pub tasks: Vec<TaskRecord>,
}

impl WorkflowSnapshot {
    pub fn load(store: &dyn EngineStore, workflow_id: WorkflowId) -> Result<Self, CoreError> {
        let workflow = store.find_workflow(workflow_id)?.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::WorkflowNotFound,
                format!("workflow '{workflow_id}' was not found"),
            )
            .workflow(workflow_id)
        })?;
        let tasks = store.list_workflow_tasks(workflow_id)?;
        Ok(Self { workflow, tasks })
    }

    pub fn task_at_step(&self, step_number: u32) -> Option<&TaskRecord> {
        self.tasks
            .iter()
            .find(|task| task.step_number == step_number)
    }
}

pub struct WorkflowBuilder {
    store: Arc<dyn EngineStore>,
}

impl WorkflowBuilder {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    pub fn build_from_file(
        &self,
        path: impl AsRef<Path>,
        client_id: &str,
        input: &str,
    ) -> Result<WorkflowSnapshot, CoreError> {
        let definition = WorkflowDefinition::from_file(path)?;
        self.build(&definition, client_id, input)
    }

    /// Saves a new workflow in status `Initial` and one queued task per step,
    /// then reads the whole graph back.
    ///
    /// The workflow row is written before the task batch. If the batch is
    /// rejected the workflow stays in storage with no tasks and is marked
    /// `Failed`.
    pub fn build(
        &self,
        definition: &WorkflowDefinition,
        client_id: &str,
        input: &str,
    ) -> Result<WorkflowSnapshot, CoreError> {
        definition.validate_structure()?;

        let workflow_id = WorkflowId(self.store.next_workflow_id()?);
        let tasks = self.plan_tasks(workflow_id, definition, client_id, input)?;

        let mut workflow =
            WorkflowRecord::initial(workflow_id, definition.name.as_str(), client_id);
        self.store
            .create_workflow(&workflow)
            .map_err(|error| {
                invalid_definition(workflow_id, "failed to save the workflow", error)
            })?;

        if let Err(error) = self.store.create_tasks(&tasks) {
            workflow.status = WorkflowStatus::Failed;
            if let Err(mark_error) = self.store.update_workflow(&workflow) {
                tracing::error!(
                    workflow_id = workflow_id.0,
                    kind = ?mark_error.kind,
                    message = %mark_error.message,
                    "failed to mark workflow without tasks as failed"
                );
            }
            return Err(invalid_definition(workflow_id, "failed to save workflow tasks", error));
        }

        tracing::info!(
            workflow_id = workflow_id.0,
            workflow = %definition.name,
            client_id = %client_id,
            task_count = tasks.len(),
            "built workflow"
        );

        WorkflowSnapshot::load(self.store.as_ref(), workflow_id)
    }

    fn plan_tasks(
        &self,
        workflow_id: WorkflowId,
        definition: &WorkflowDefinition,
        client_id: &str,
        input: &str,
    ) -> Result<Vec<TaskRecord>, CoreError> {
        let first_task_id = self.store.next_task_id()?;
        let mut tasks_by_step: HashMap<u32, TaskId> = HashMap::new();
        let mut tasks = Vec::with_capacity(definition.steps.len());

        for (offset, step) in (0u64..).zip(&definition.steps) {
            let task_id = TaskId(first_task_id.saturating_add(offset));
            let mut task = TaskRecord::queued(
                task_id,
                workflow_id,
                client_id,
                input,
                step.task_type.as_str(),
                step.step_number,
            );

            if let Some(depends_on) = step.depends_on {
                let dependency = tasks_by_step.get(&depends_on).copied().ok_or_else(|| {
                    CoreError::new(
                        CoreErrorKind::InvalidDefinition,
                        format!(
                            "step {} depends on step {depends_on}, which has not been created",
                            step.step_number
                        ),
                    )
                    .workflow(workflow_id)
                })?;
                task = task.depends_on(dependency);
            }

            tasks_by_step.insert(step.step_number, task_id);
            tasks.push(task);
        }

        Ok(tasks)
    }
}

fn invalid_definition(workflow_id: WorkflowId, context: &str, error: CoreError) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidDefinition,
        format!("{context}: {}", error.message),
    )
    .workflow(workflow_id)
}
