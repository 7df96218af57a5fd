pub mod builder;
pub mod definition;

pub use builder::{WorkflowBuilder, WorkflowSnapshot};
pub use definition::{DefinitionError, WorkflowDefinition, WorkflowStep};
