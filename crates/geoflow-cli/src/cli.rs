use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run GeoJSON processing workflows against a local SQLite database.
#[derive(Debug, Parser)]
#[command(name = "geoflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite database holding workflows, tasks and results
    #[arg(
        long,
        global = true,
        env = "GEOFLOW_DATABASE",
        default_value = "geoflow.sqlite3"
    )]
    pub database: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a workflow from a definition and start it
    Run(RunArgs),

    /// Continue a workflow from its lowest queued step
    Resume(WorkflowArgs),

    /// Show a workflow with its tasks and results
    Status(WorkflowArgs),

    /// List recently created workflows
    List(ListArgs),

    /// List registered task types
    Jobs,

    /// Check a workflow definition without running it
    Validate(ValidateArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Workflow definition (YAML)
    pub definition: PathBuf,

    /// Client the workflow runs for
    #[arg(long)]
    pub client_id: String,

    /// GeoJSON document handed to every task
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct WorkflowArgs {
    pub workflow_id: u64,
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, clap::Args)]
pub struct ValidateArgs {
    /// Workflow definition (YAML)
    pub definition: PathBuf,
}
