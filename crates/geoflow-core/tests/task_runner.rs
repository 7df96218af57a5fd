use std::sync::Arc;

use geoflow_core::jobs::{Job, JobContext, JobResult};
use geoflow_core::models::{
    CoreError, CoreErrorKind, ResultId, ResultRecord, TaskId, TaskRecord, TaskStatus, WorkflowId,
    WorkflowRecord, WorkflowStatus,
};
use geoflow_core::orchestration::{
    BlockedTask, ChainReport, RunOutcome, STARTING_PROGRESS, TaskRunner,
};
use geoflow_core::persistence::{
    EngineStore, InMemoryStore, PersistenceResult, ResultStore, TaskStore, WorkflowStore,
};
use geoflow_core::registry::{self, JobDescriptor, JobRegistry};
use geoflow_core::workflows::{WorkflowBuilder, WorkflowDefinition, WorkflowSnapshot, WorkflowStep};

const POLYGON: &str = r#"{
    "type": "Feature",
    "properties": {},
    "geometry": {
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
    }
}"#;

struct FailingJob;

impl Job for FailingJob {
    fn execute(&self, context: &JobContext<'_>) -> JobResult<serde_json::Value> {
        Err(context.failure("simulated job failure"))
    }
}

fn failing_job() -> Box<dyn Job> {
    Box::new(FailingJob)
}

/// In-memory store that refuses to save a task in `Failed` status.
struct RejectsFailedTasks {
    inner: InMemoryStore,
}

impl WorkflowStore for RejectsFailedTasks {
    fn next_workflow_id(&self) -> PersistenceResult<u64> {
        self.inner.next_workflow_id()
    }

    fn create_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()> {
        self.inner.create_workflow(workflow)
    }

    fn update_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()> {
        self.inner.update_workflow(workflow)
    }

    fn find_workflow(&self, workflow_id: WorkflowId) -> PersistenceResult<Option<WorkflowRecord>> {
        self.inner.find_workflow(workflow_id)
    }

    fn list_recent_workflows(&self, limit: usize) -> PersistenceResult<Vec<WorkflowRecord>> {
        self.inner.list_recent_workflows(limit)
    }
}

impl TaskStore for RejectsFailedTasks {
    fn next_task_id(&self) -> PersistenceResult<u64> {
        self.inner.next_task_id()
    }

    fn create_tasks(&self, tasks: &[TaskRecord]) -> PersistenceResult<()> {
        self.inner.create_tasks(tasks)
    }

    fn update_task(&self, task: &TaskRecord) -> PersistenceResult<()> {
        if task.status == TaskStatus::Failed {
            return Err(CoreError::new(CoreErrorKind::StorageFailure, "database is locked"));
        }
        self.inner.update_task(task)
    }

    fn find_task(&self, task_id: TaskId) -> PersistenceResult<Option<TaskRecord>> {
        self.inner.find_task(task_id)
    }

    fn list_workflow_tasks(&self, workflow_id: WorkflowId) -> PersistenceResult<Vec<TaskRecord>> {
        self.inner.list_workflow_tasks(workflow_id)
    }
}

impl ResultStore for RejectsFailedTasks {
    fn next_result_id(&self) -> PersistenceResult<u64> {
        self.inner.next_result_id()
    }

    fn commit_result(&self, result: &ResultRecord, task: &TaskRecord) -> PersistenceResult<()> {
        self.inner.commit_result(result, task)
    }

    fn find_result(&self, result_id: ResultId) -> PersistenceResult<Option<ResultRecord>> {
        self.inner.find_result(result_id)
    }

    fn list_task_results(&self, task_id: TaskId) -> PersistenceResult<Vec<ResultRecord>> {
        self.inner.list_task_results(task_id)
    }
}

struct Harness {
    store: Arc<dyn EngineStore>,
    builder: WorkflowBuilder,
    runner: TaskRunner,
}

fn harness() -> Harness {
    harness_with(Arc::new(InMemoryStore::new()))
}

fn harness_with(store: Arc<dyn EngineStore>) -> Harness {
    let failing = JobDescriptor {
        task_type: "failing",
        display_name: "Always fails",
        factory: failing_job,
    };
    let registry =
        JobRegistry::with_jobs(registry::builtin_jobs().iter().copied().chain([failing])).unwrap();

    Harness {
        builder: WorkflowBuilder::new(store.clone()),
        runner: TaskRunner::new(store.clone(), Arc::new(registry)),
        store,
    }
}

impl Harness {
    fn build(&self, steps: Vec<WorkflowStep>) -> WorkflowSnapshot {
        self.builder
            .build(&WorkflowDefinition::new("test", steps), "client-1", POLYGON)
            .unwrap()
    }

    fn reload(&self, workflow_id: WorkflowId) -> WorkflowSnapshot {
        WorkflowSnapshot::load(self.store.as_ref(), workflow_id).unwrap()
    }

    fn task(&self, task_id: TaskId) -> TaskRecord {
        self.store.find_task(task_id).unwrap().unwrap()
    }
}

fn ids(snapshot: &WorkflowSnapshot) -> Vec<TaskId> {
    snapshot.tasks.iter().map(|task| task.id).collect()
}

#[test]
fn linear_workflow_runs_every_step_once_in_order() {
    let harness = harness();
    let built = harness.build(vec![
        WorkflowStep::new("analysis", 1),
        WorkflowStep::new("polygon_area", 2),
        WorkflowStep::new("notification", 3),
    ]);

    let outcome = harness.runner.start_workflow(built.workflow.id).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Ran(ChainReport {
            executed: ids(&built),
            blocked: None,
        })
    );

    let after = harness.reload(built.workflow.id);
    assert_eq!(after.workflow.status, WorkflowStatus::Completed);
    for task in &after.tasks {
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, None);
        assert!(task.output.is_some());
        assert_eq!(harness.store.list_task_results(task.id).unwrap().len(), 1);
    }
}

#[test]
fn waiting_on_an_incomplete_dependency_changes_nothing() {
    let harness = harness();
    let built = harness.build(vec![
        WorkflowStep::new("analysis", 1),
        WorkflowStep::new("notification", 2).depends_on(1),
    ]);
    let first = built.task_at_step(1).unwrap().clone();
    let second = built.task_at_step(2).unwrap().clone();

    let outcome = harness.runner.run(second.id).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::WaitingOnDependency(BlockedTask {
            task: second.id,
            dependency: first.id,
        })
    );
    assert_eq!(harness.task(second.id), second);
    assert_eq!(harness.reload(built.workflow.id).workflow, built.workflow);

    // Once the dependency runs, the walk unblocks the dependent step.
    let outcome = harness.runner.run(first.id).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Ran(ChainReport {
            executed: vec![first.id, second.id],
            blocked: None,
        })
    );
    assert_eq!(
        harness.reload(built.workflow.id).workflow.status,
        WorkflowStatus::Completed
    );
}

#[test]
fn chain_stops_at_a_step_whose_dependency_never_ran() {
    let harness = harness();
    let built = harness.build(vec![
        WorkflowStep::new("analysis", 1),
        WorkflowStep::new("notification", 2),
        WorkflowStep::new("polygon_area", 3).depends_on(1),
    ]);
    let [first, second, third] = [1, 2, 3].map(|step| built.task_at_step(step).unwrap().id);

    let outcome = harness.runner.run(second).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Ran(ChainReport {
            executed: vec![second],
            blocked: Some(BlockedTask {
                task: third,
                dependency: first,
            }),
        })
    );

    let after = harness.reload(built.workflow.id);
    assert_eq!(after.workflow.status, WorkflowStatus::InProgress);
    assert_eq!(harness.task(first).status, TaskStatus::Queued);
    assert_eq!(harness.task(third).status, TaskStatus::Queued);
}

#[test]
fn failed_job_marks_task_failed_and_halts_the_chain() {
    let harness = harness();
    let built = harness.build(vec![
        WorkflowStep::new("analysis", 1),
        WorkflowStep::new("failing", 2),
        WorkflowStep::new("notification", 3),
    ]);
    let [first, second, third] = [1, 2, 3].map(|step| built.task_at_step(step).unwrap().id);

    let error = harness.runner.start_workflow(built.workflow.id).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::JobExecution);
    assert_eq!(error.task, Some(second));
    assert_eq!(error.workflow, Some(built.workflow.id));

    let failed = harness.task(second);
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.progress, None);
    assert_eq!(failed.result_id, None);
    assert!(harness.store.list_task_results(second).unwrap().is_empty());
    assert_eq!(harness.task(third).status, TaskStatus::Queued);

    // Aggregation only runs after a success, so the snapshot still reflects step 1.
    let after = harness.reload(built.workflow.id);
    assert_eq!(after.workflow.status, WorkflowStatus::InProgress);
    assert_eq!(harness.task(first).status, TaskStatus::Completed);

    let refreshed = harness.runner.refresh_workflow(built.workflow.id).unwrap();
    assert_eq!(refreshed.status, WorkflowStatus::Failed);
}

#[test]
fn resume_runs_the_lowest_queued_step_and_keeps_the_failure_visible() {
    let harness = harness();
    let built = harness.build(vec![
        WorkflowStep::new("failing", 1),
        WorkflowStep::new("analysis", 2),
    ]);
    let second = built.task_at_step(2).unwrap().id;

    harness.runner.start_workflow(built.workflow.id).unwrap_err();

    let outcome = harness.runner.resume_workflow(built.workflow.id).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Ran(ChainReport {
            executed: vec![second],
            blocked: None,
        })
    );
    assert_eq!(
        harness.reload(built.workflow.id).workflow.status,
        WorkflowStatus::Failed
    );
    assert_eq!(
        harness.runner.resume_workflow(built.workflow.id).unwrap(),
        RunOutcome::NoEligibleTask
    );
}

#[test]
fn unknown_task_type_is_raised_after_the_task_is_marked_in_progress() {
    let harness = harness();
    let built = harness.build(vec![WorkflowStep::new("unknown_type", 1)]);
    let task_id = built.task_at_step(1).unwrap().id;

    let error = harness.runner.run(task_id).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::UnknownTaskType);
    assert_eq!(error.task, Some(task_id));

    // Dispatch happens after the InProgress write and nothing rolls it back.
    let stuck = harness.task(task_id);
    assert_eq!(stuck.status, TaskStatus::InProgress);
    assert_eq!(stuck.progress.as_deref(), Some(STARTING_PROGRESS));
    assert!(harness.store.list_task_results(task_id).unwrap().is_empty());
    assert_eq!(
        harness.reload(built.workflow.id).workflow.status,
        WorkflowStatus::Initial
    );

    let error = harness.runner.run(task_id).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidTransition);
}

#[test]
fn terminal_tasks_are_not_run_again() {
    let harness = harness();
    let built = harness.build(vec![WorkflowStep::new("analysis", 1)]);
    let task_id = built.task_at_step(1).unwrap().id;

    harness.runner.run(task_id).unwrap();
    let error = harness.runner.run(task_id).unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::InvalidTransition);
    assert_eq!(harness.store.list_task_results(task_id).unwrap().len(), 1);
}

#[test]
fn workflow_without_a_first_step_has_no_eligible_task() {
    let harness = harness();
    let workflow_id = WorkflowId(harness.store.next_workflow_id().unwrap());
    harness
        .store
        .create_workflow(&geoflow_core::models::WorkflowRecord::initial(
            workflow_id,
            "late-start",
            "client-1",
        ))
        .unwrap();
    harness
        .store
        .create_tasks(&[TaskRecord::queued(
            TaskId(1),
            workflow_id,
            "client-1",
            POLYGON,
            "analysis",
            2,
        )])
        .unwrap();

    let outcome = harness.runner.start_workflow(workflow_id).unwrap();
    assert_eq!(outcome, RunOutcome::NoEligibleTask);
    assert_eq!(harness.task(TaskId(1)).status, TaskStatus::Queued);
}

#[test]
fn running_a_missing_task_reports_task_not_found() {
    let harness = harness();
    let error = harness.runner.run(TaskId(404)).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::TaskNotFound);
}

#[test]
fn invalid_geojson_fails_the_analysis_job() {
    let harness = harness();
    let built = harness
        .builder
        .build(
            &WorkflowDefinition::new("bad-input", vec![WorkflowStep::new("analysis", 1)]),
            "client-1",
            "not json",
        )
        .unwrap();
    let task_id = built.task_at_step(1).unwrap().id;

    let error = harness.runner.start_workflow(built.workflow.id).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::JobExecution);
    assert_eq!(harness.task(task_id).status, TaskStatus::Failed);
}

#[test]
fn failure_to_record_a_failed_task_surfaces_the_storage_error() {
    let harness = harness_with(Arc::new(RejectsFailedTasks {
        inner: InMemoryStore::new(),
    }));
    let built = harness.build(vec![WorkflowStep::new("failing", 1)]);
    let task_id = built.tasks[0].id;

    let error = harness.runner.start_workflow(built.workflow.id).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
    assert_eq!(error.task, Some(task_id));
    assert_eq!(error.workflow, Some(built.workflow.id));
    assert!(error.message.contains("simulated job failure"));
    assert!(error.message.contains("database is locked"));

    let stored = harness.task(task_id);
    assert_eq!(stored.status, TaskStatus::InProgress);
    assert_eq!(stored.progress.as_deref(), Some(STARTING_PROGRESS));
}
