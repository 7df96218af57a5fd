pub mod error;
pub mod result;
pub mod summary;
pub mod task;
pub mod workflow;

pub use error::{CoreError, CoreErrorKind};
pub use result::{ResultId, ResultRecord};
pub use summary::TaskSummary;
pub use task::{TaskId, TaskRecord, TaskStatus};
pub use workflow::{WorkflowId, WorkflowRecord, WorkflowStatus};
