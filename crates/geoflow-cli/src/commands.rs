use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use geoflow_core::models::{CoreError, ResultRecord, TaskRecord, WorkflowId, WorkflowRecord};
use geoflow_core::orchestration::{RunOutcome, TaskRunner};
use geoflow_core::persistence::{EngineStore, ResultStore, WorkflowStore};
use geoflow_core::registry::JobRegistry;
use geoflow_core::sqlite::SqliteStore;
use geoflow_core::workflows::{WorkflowBuilder, WorkflowDefinition, WorkflowSnapshot};

use crate::cli::{Cli, Commands, ListArgs, RunArgs, ValidateArgs, WorkflowArgs};

#[derive(Serialize)]
struct TaskView {
    #[serde(flatten)]
    task: TaskRecord,
    results: Vec<ResultRecord>,
}

#[derive(Serialize)]
struct StatusView {
    workflow: WorkflowRecord,
    tasks: Vec<TaskView>,
}

#[derive(Serialize)]
struct RunView {
    outcome: &'static str,
    executed: Vec<u64>,
    blocked_task: Option<u64>,
    waiting_on: Option<u64>,
}

impl From<&RunOutcome> for RunView {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Ran(report) => Self {
                outcome: "ran",
                executed: report.executed.iter().map(|id| id.0).collect(),
                blocked_task: report.blocked.map(|blocked| blocked.task.0),
                waiting_on: report.blocked.map(|blocked| blocked.dependency.0),
            },
            RunOutcome::WaitingOnDependency(blocked) => Self {
                outcome: "waiting_on_dependency",
                executed: Vec::new(),
                blocked_task: Some(blocked.task.0),
                waiting_on: Some(blocked.dependency.0),
            },
            RunOutcome::NoEligibleTask => Self {
                outcome: "no_eligible_task",
                executed: Vec::new(),
                blocked_task: None,
                waiting_on: None,
            },
        }
    }
}

#[derive(Serialize)]
struct JobView {
    task_type: &'static str,
    display_name: &'static str,
}

pub fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => run(&cli.database, args),
        Commands::Resume(args) => resume(&cli.database, args),
        Commands::Status(args) => status(&cli.database, args),
        Commands::List(args) => list(&cli.database, args),
        Commands::Jobs => jobs(),
        Commands::Validate(args) => validate(args),
    }
}

fn open_store(database: &Path) -> Result<Arc<dyn EngineStore>> {
    let store = SqliteStore::new(database);
    store
        .migrate_to_latest()
        .with_context(|| {
            format!("failed to prepare database {}", store.database_path().display())
        })?;
    let store: Arc<dyn EngineStore> = Arc::new(store);
    Ok(store)
}

fn runner(store: Arc<dyn EngineStore>) -> TaskRunner {
    TaskRunner::new(store, Arc::new(JobRegistry::builtin()))
}

fn run(database: &Path, args: &RunArgs) -> Result<()> {
    let registry = JobRegistry::builtin();
    let definition = WorkflowDefinition::from_file(&args.definition)
        .with_context(|| format!("failed to load {}", args.definition.display()))?;
    definition
        .validate(&registry)
        .with_context(|| format!("invalid definition {}", args.definition.display()))?;

    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input {}", args.input.display()))?;

    let store = open_store(database)?;
    let snapshot = WorkflowBuilder::new(store.clone())
        .build(&definition, &args.client_id, &input)
        .context("failed to build workflow")?;
    let workflow_id = snapshot.workflow.id;

    let outcome = runner(store.clone()).start_workflow(workflow_id);
    report_run(store.as_ref(), workflow_id, outcome)
}

fn resume(database: &Path, args: &WorkflowArgs) -> Result<()> {
    let store = open_store(database)?;
    let workflow_id = WorkflowId(args.workflow_id);
    ensure_workflow(store.as_ref(), workflow_id)?;

    let outcome = runner(store.clone()).resume_workflow(workflow_id);
    report_run(store.as_ref(), workflow_id, outcome)
}

/// Prints the workflow state whether or not the chain succeeded.
fn report_run(
    store: &dyn EngineStore,
    workflow_id: WorkflowId,
    outcome: Result<RunOutcome, CoreError>,
) -> Result<()> {
    match outcome {
        Ok(outcome) => {
            print_json(&RunView::from(&outcome))?;
            print_status(store, workflow_id)
        }
        Err(error) => {
            print_status(store, workflow_id)?;
            Err(anyhow::Error::new(error).context(format!("workflow {workflow_id} stopped")))
        }
    }
}

fn status(database: &Path, args: &WorkflowArgs) -> Result<()> {
    let store = open_store(database)?;
    print_status(store.as_ref(), WorkflowId(args.workflow_id))
}

fn list(database: &Path, args: &ListArgs) -> Result<()> {
    let store = open_store(database)?;
    let workflows = store
        .list_recent_workflows(args.limit)
        .context("failed to list workflows")?;
    print_json(&workflows)
}

fn jobs() -> Result<()> {
    let registry = JobRegistry::builtin();
    let jobs: Vec<JobView> = registry
        .descriptors()
        .map(|descriptor| JobView {
            task_type: descriptor.task_type,
            display_name: descriptor.display_name,
        })
        .collect();
    print_json(&jobs)
}

fn validate(args: &ValidateArgs) -> Result<()> {
    let definition = WorkflowDefinition::from_file(&args.definition)
        .with_context(|| format!("failed to load {}", args.definition.display()))?;
    definition
        .validate(&JobRegistry::builtin())
        .with_context(|| format!("invalid definition {}", args.definition.display()))?;

    tracing::info!(
        workflow = %definition.name,
        steps = definition.steps.len(),
        "definition is valid"
    );
    Ok(())
}

fn ensure_workflow(store: &dyn EngineStore, workflow_id: WorkflowId) -> Result<()> {
    if store.find_workflow(workflow_id)?.is_none() {
        bail!("workflow {workflow_id} does not exist");
    }
    Ok(())
}

fn print_status(store: &dyn EngineStore, workflow_id: WorkflowId) -> Result<()> {
    let snapshot = WorkflowSnapshot::load(store, workflow_id)
        .with_context(|| format!("failed to load workflow {workflow_id}"))?;

    let mut tasks = Vec::with_capacity(snapshot.tasks.len());
    for task in snapshot.tasks {
        let results = store
            .list_task_results(task.id)
            .with_context(|| format!("failed to load results for task {}", task.id))?;
        tasks.push(TaskView { task, results });
    }

    print_json(&StatusView {
        workflow: snapshot.workflow,
        tasks,
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
