pub mod runner;

pub use runner::{BlockedTask, ChainReport, RunOutcome, STARTING_PROGRESS, TaskRunner};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
