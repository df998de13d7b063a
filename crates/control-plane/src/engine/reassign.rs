//! Project thread inheritance.

use tracing::info;

use crate::api::{ObjectKey, WorkflowExecution, WorkflowSpec};
use crate::error::AppResult;
use crate::store::Client;

#[derive(Clone)]
pub struct Reassigner {
    client: Client,
}

impl Reassigner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Copy the template's project thread into an execution that has none.
    ///
    /// Only applies before the execution's own thread exists: an explicit
    /// `spec.thread_name` or a recorded `status.thread_name` are left alone.
    /// Returns whether the execution spec was updated.
    pub async fn reassign(&self, execution: &mut WorkflowExecution) -> AppResult<bool> {
        if !execution.spec.thread_name.is_empty()
            || !execution.status.thread_name.is_empty()
            || execution.spec.workflow_name.is_empty()
        {
            return Ok(false);
        }

        let key = ObjectKey::new(execution.namespace(), &execution.spec.workflow_name);
        let Some(workflow) = self.client.find::<WorkflowSpec>(&key).await? else {
            return Ok(false);
        };
        if workflow.spec.thread_name.is_empty() {
            return Ok(false);
        }

        execution.spec.thread_name = workflow.spec.thread_name.clone();
        *execution = self.client.update(execution).await?;
        info!(
            "Execution {} inherits project thread '{}'",
            execution.key(),
            execution.spec.thread_name
        );

        Ok(true)
    }
}
