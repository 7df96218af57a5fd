use std::sync::Arc;
use std::time::SystemTime;

use crate::jobs::JobContext;
use crate::models::{
    CoreError, CoreErrorKind, ResultId, ResultRecord, TaskId, TaskRecord, TaskStatus, TaskSummary,
    WorkflowId, WorkflowRecord, WorkflowStatus,
};
use crate::orchestration::OrchestrationResult;
use crate::persistence::EngineStore;
use crate::registry::JobRegistry;
use crate::workflows::WorkflowSnapshot;

pub const STARTING_PROGRESS: &str = "starting job...";

/// A task that could not start because its dependency has not completed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockedTask {
    pub task: TaskId,
    pub dependency: TaskId,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChainReport {
    /// Tasks completed by this call, in execution order.
    pub executed: Vec<TaskId>,
    /// Set when the chain stopped at a task whose dependency is still pending.
    pub blocked: Option<BlockedTask>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    Ran(ChainReport),
    WaitingOnDependency(BlockedTask),
    NoEligibleTask,
}

enum StepOutcome {
    Completed { next: Option<TaskId> },
    Blocked(BlockedTask),
}

/// Executes tasks one at a time: gate on the direct dependency, run the job,
/// persist the result, refresh the workflow aggregate, then move to the next
/// queued step.
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn EngineStore>,
    registry: Arc<JobRegistry>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn EngineStore>, registry: Arc<JobRegistry>) -> Self {
        Self { store, registry }
    }

    /// Runs the step-1 task that has no dependency.
    pub fn start_workflow(&self, workflow_id: WorkflowId) -> OrchestrationResult<RunOutcome> {
        let tasks = self.store.list_workflow_tasks(workflow_id)?;
        let first = tasks
            .iter()
            .find(|task| task.step_number == 1 && task.depends_on.is_none());

        match first {
            Some(task) => self.run(task.id),
            None => {
                tracing::warn!(
                    workflow_id = workflow_id.0,
                    task_count = tasks.len(),
                    "no starting task found for workflow"
                );
                Ok(RunOutcome::NoEligibleTask)
            }
        }
    }

    /// Re-triggers a workflow from its lowest queued step.
    pub fn resume_workflow(&self, workflow_id: WorkflowId) -> OrchestrationResult<RunOutcome> {
        let tasks = self.store.list_workflow_tasks(workflow_id)?;
        match tasks.iter().find(|task| task.status == TaskStatus::Queued) {
            Some(task) => self.run(task.id),
            None => {
                tracing::info!(
                    workflow_id = workflow_id.0,
                    "workflow has no queued task to resume"
                );
                Ok(RunOutcome::NoEligibleTask)
            }
        }
    }

    /// Runs `task_id` and then each following step while they succeed.
    ///
    /// A job failure marks its task `Failed` and is returned as the error; the
    /// chain does not advance past it.
    pub fn run(&self, task_id: TaskId) -> OrchestrationResult<RunOutcome> {
        let mut report = ChainReport::default();
        let mut cursor = Some(task_id);

        while let Some(current) = cursor {
            match self.run_step(current)? {
                StepOutcome::Blocked(blocked) if report.executed.is_empty() => {
                    return Ok(RunOutcome::WaitingOnDependency(blocked));
                }
                StepOutcome::Blocked(blocked) => {
                    report.blocked = Some(blocked);
                    cursor = None;
                }
                StepOutcome::Completed { next } => {
                    report.executed.push(current);
                    cursor = next;
                }
            }
        }

        Ok(RunOutcome::Ran(report))
    }

    /// Recomputes the workflow status and final result from its tasks.
    pub fn refresh_workflow(&self, workflow_id: WorkflowId) -> OrchestrationResult<WorkflowRecord> {
        self.aggregate(workflow_id).map(|snapshot| snapshot.workflow)
    }

    fn run_step(&self, task_id: TaskId) -> OrchestrationResult<StepOutcome> {
        let mut task = self.load_task(task_id)?;

        if let Some(dependency_id) = task.depends_on {
            let dependency = self.load_task(dependency_id)?;
            if dependency.status != TaskStatus::Completed {
                tracing::info!(
                    workflow_id = task.workflow_id.0,
                    task_id = task.id.0,
                    dependency_id = dependency_id.0,
                    dependency_status = dependency.status.as_str(),
                    "task is waiting for its dependency to complete"
                );
                return Ok(StepOutcome::Blocked(BlockedTask {
                    task: task.id,
                    dependency: dependency_id,
                }));
            }
        }

        if task.status != TaskStatus::Queued {
            return Err(invalid_transition(&task, TaskStatus::InProgress));
        }

        task.status = TaskStatus::InProgress;
        task.progress = Some(STARTING_PROGRESS.to_string());
        self.store.update_task(&task)?;

        // Dispatch failures leave the task InProgress.
        let job = self
            .registry
            .resolve(&task.task_type)
            .map_err(|error| error.attribute(task.workflow_id, task.id, &task.task_type))?;

        tracing::info!(
            workflow_id = task.workflow_id.0,
            task_id = task.id.0,
            task_type = %task.task_type,
            step = task.step_number,
            "starting job"
        );

        let outcome = job.execute(&JobContext::new(&task, self.store.as_ref()));
        match outcome {
            Ok(output) => self.complete_task(&mut task, output)?,
            Err(error) => return Err(self.fail_task(&mut task, error)?),
        }

        let snapshot = self.aggregate(task.workflow_id)?;
        let next_step = task.step_number.saturating_add(1);
        let next = snapshot
            .tasks
            .iter()
            .find(|candidate| {
                candidate.step_number == next_step && candidate.status == TaskStatus::Queued
            })
            .map(|candidate| candidate.id);

        Ok(StepOutcome::Completed { next })
    }

    fn complete_task(
        &self,
        task: &mut TaskRecord,
        output: serde_json::Value,
    ) -> OrchestrationResult<()> {
        let data = serde_json::to_string(&output).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to serialize job output: {error}"),
            )
            .attribute(task.workflow_id, task.id, &task.task_type)
        })?;

        let result = ResultRecord {
            id: ResultId(self.store.next_result_id()?),
            task_id: task.id,
            data,
            created_at: SystemTime::now(),
        };

        task.output = Some(output);
        task.result_id = Some(result.id);
        task.status = TaskStatus::Completed;
        task.progress = None;
        self.store.commit_result(&result, task)?;

        tracing::info!(
            workflow_id = task.workflow_id.0,
            task_id = task.id.0,
            task_type = %task.task_type,
            result_id = result.id.0,
            "job completed"
        );
        Ok(())
    }

    /// Persists the `Failed` status and hands back the attributed job error.
    ///
    /// If the status cannot be saved the task stays `InProgress` in storage and
    /// the storage error is returned instead, carrying the job error's message.
    fn fail_task(
        &self,
        task: &mut TaskRecord,
        error: CoreError,
    ) -> OrchestrationResult<CoreError> {
        let error = error.attribute(task.workflow_id, task.id, &task.task_type);
        tracing::error!(
            workflow_id = task.workflow_id.0,
            task_id = task.id.0,
            task_type = %task.task_type,
            kind = ?error.kind,
            message = %error.message,
            "job failed"
        );

        task.status = TaskStatus::Failed;
        task.progress = None;
        self.store.update_task(task).map_err(|persist_error| {
            tracing::error!(
                workflow_id = task.workflow_id.0,
                task_id = task.id.0,
                kind = ?persist_error.kind,
                message = %persist_error.message,
                "failed to persist failed task status"
            );
            CoreError::new(
                persist_error.kind,
                format!(
                    "failed to record task failure ({}): {}",
                    error.message, persist_error.message
                ),
            )
            .attribute(task.workflow_id, task.id, &task.task_type)
        })?;

        Ok(error)
    }

    fn aggregate(&self, workflow_id: WorkflowId) -> OrchestrationResult<WorkflowSnapshot> {
        let mut snapshot = WorkflowSnapshot::load(self.store.as_ref(), workflow_id)?;
        let workflow = &mut snapshot.workflow;
        workflow.status = WorkflowStatus::aggregate(snapshot.tasks.iter().map(|task| task.status));
        workflow.final_result = Some(snapshot.tasks.iter().map(TaskSummary::from).collect());
        self.store.update_workflow(workflow)?;

        tracing::debug!(
            workflow_id = workflow_id.0,
            status = workflow.status.as_str(),
            "workflow aggregate updated"
        );
        Ok(snapshot)
    }

    fn load_task(&self, task_id: TaskId) -> OrchestrationResult<TaskRecord> {
        self.store.find_task(task_id)?.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::TaskNotFound,
                format!("unknown task id '{task_id}'"),
            )
            .task(task_id)
        })
    }
}

fn invalid_transition(task: &TaskRecord, desired: TaskStatus) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidTransition,
        format!(
            "task '{}' cannot transition from '{}' to '{}'",
            task.id,
            task.status.as_str(),
            desired.as_str()
        ),
    )
    .attribute(task.workflow_id, task.id, &task.task_type)
}
