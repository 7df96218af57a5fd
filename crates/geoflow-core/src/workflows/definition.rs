use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CoreError, CoreErrorKind};
use crate::registry::JobRegistry;

/// One entry of a workflow definition. `depends_on` names the step number of
/// an earlier step.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub task_type: String,
    pub step_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<u32>,
}

impl WorkflowStep {
    pub fn new(task_type: impl Into<String>, step_number: u32) -> Self {
        Self {
            task_type: task_type.into(),
            step_number,
            depends_on: None,
        }
    }

    pub fn depends_on(mut self, step_number: u32) -> Self {
        self.depends_on = Some(step_number);
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read workflow definition {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("workflow definition '{name}' has no steps")]
    EmptyWorkflow { name: String },

    #[error("step '{task_type}' has step number 0; step numbers start at 1")]
    ZeroStepNumber { task_type: String },

    #[error("step number {step_number} is defined more than once")]
    DuplicateStepNumber { step_number: u32 },

    #[error("step {step_number} depends on step {depends_on}, which is not defined before it")]
    UnknownDependency { step_number: u32, depends_on: u32 },

    #[error("step {step_number} uses unregistered task type '{task_type}'")]
    UnregisteredTaskType { step_number: u32, task_type: String },
}

impl From<DefinitionError> for CoreError {
    fn from(error: DefinitionError) -> Self {
        let (kind, task_type) = match &error {
            DefinitionError::UnregisteredTaskType { task_type, .. } => {
                (CoreErrorKind::UnknownTaskType, Some(task_type.clone()))
            }
            _ => (CoreErrorKind::InvalidDefinition, None),
        };
        CoreError {
            task_type,
            ..CoreError::new(kind, error.to_string())
        }
    }
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Checks the step graph without looking at task types: steps exist, step
    /// numbers are positive and unique, and every dependency points at a step
    /// listed earlier.
    pub fn validate_structure(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::EmptyWorkflow {
                name: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_number == 0 {
                return Err(DefinitionError::ZeroStepNumber {
                    task_type: step.task_type.clone(),
                });
            }
            if let Some(depends_on) = step.depends_on
                && !seen.contains(&depends_on)
            {
                return Err(DefinitionError::UnknownDependency {
                    step_number: step.step_number,
                    depends_on,
                });
            }
            if !seen.insert(step.step_number) {
                return Err(DefinitionError::DuplicateStepNumber {
                    step_number: step.step_number,
                });
            }
        }

        if let Some(missing) = (1..=self.steps.len() as u32).find(|step| !seen.contains(step)) {
            tracing::warn!(
                workflow = %self.name,
                missing_step = missing,
                "workflow steps are not contiguous; steps after the gap only run when triggered"
            );
        }

        Ok(())
    }

    pub fn validate(&self, registry: &JobRegistry) -> Result<(), DefinitionError> {
        self.validate_structure()?;
        for step in &self.steps {
            if !registry.contains(&step.task_type) {
                return Err(DefinitionError::UnregisteredTaskType {
                    step_number: step.step_number,
                    task_type: step.task_type.clone(),
                });
            }
        }
        Ok(())
    }
}
