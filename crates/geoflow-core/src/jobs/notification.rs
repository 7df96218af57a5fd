use serde_json::json;

use crate::jobs::{Job, JobContext, JobResult};

pub struct NotificationJob;

impl Job for NotificationJob {
    fn execute(&self, context: &JobContext<'_>) -> JobResult<serde_json::Value> {
        let task = context.task();
        if task.client_id.trim().is_empty() {
            return Err(context.failure("notification requires a client id"));
        }

        tracing::info!(
            workflow_id = task.workflow_id.0,
            task_id = task.id.0,
            client_id = %task.client_id,
            "sending workflow notification"
        );

        Ok(json!({
            "channel": "email",
            "clientId": task.client_id,
            "delivered": true,
        }))
    }
}
