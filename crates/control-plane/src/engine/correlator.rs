//! Delivery of nested execution results to waiting runs.

use tracing::{debug, info};

use crate::api::{ObjectKey, Run, RunSpec, WorkflowExecution};
use crate::error::AppResult;
use crate::store::Client;

#[derive(Clone)]
pub struct Correlator {
    client: Client,
}

impl Correlator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Record a finished child execution's result on the run waiting for it.
    ///
    /// The run must currently be suspended on an external call whose id is
    /// the child's name. A result already recorded for that id is never
    /// overwritten. Returns the updated run when a result was delivered.
    pub async fn correlate(&self, child: &WorkflowExecution) -> AppResult<Option<Run>> {
        if !child.status.state.is_terminal() || child.spec.run_name.is_empty() {
            return Ok(None);
        }

        let key = ObjectKey::new(child.namespace(), &child.spec.run_name);
        let Some(mut run) = self.client.find::<RunSpec>(&key).await? else {
            debug!("Run {} waiting on {} not found", key, child.key());
            return Ok(None);
        };

        if run.spec.result(child.name()).is_some() {
            debug!("Run {} already holds the result of {}", key, child.key());
            return Ok(None);
        }
        if run.status.pending_call_id() != Some(child.name()) {
            return Ok(None);
        }

        let data = if child.status.error.is_empty() {
            child.status.output.as_str()
        } else {
            child.status.error.as_str()
        };
        if !run.spec.record_result(child.name(), data) {
            return Ok(None);
        }

        let run = self.client.update(&run).await?;
        info!("Delivered result of execution {} to run {}", child.key(), key);

        Ok(Some(run))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{ExternalCall, WorkflowExecutionSpec, WorkflowState};
    use crate::store::MemoryStore;

    async fn waiting_run(client: &Client, call_id: &str) -> Run {
        let mut run = client
            .create(&Run::new("default", "run1", RunSpec::default()))
            .await
            .unwrap();
        run.status.external_call = Some(ExternalCall {
            id: call_id.to_string(),
        });
        client.update_status(&run).await.unwrap()
    }

    fn child(state: WorkflowState, output: &str, error: &str) -> WorkflowExecution {
        let mut child = WorkflowExecution::new(
            "default",
            "child",
            WorkflowExecutionSpec {
                workflow_name: "wf".to_string(),
                run_name: "run1".to_string(),
                ..Default::default()
            },
        );
        child.status.state = state;
        child.status.output = output.to_string();
        child.status.error = error.to_string();
        child
    }

    #[tokio::test]
    async fn test_delivers_output_once() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        waiting_run(&client, "child").await;
        let correlator = Correlator::new(client.clone());

        let run = correlator
            .correlate(&child(WorkflowState::Complete, "42", ""))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.spec.result("child"), Some("42"));

        let again = correlator
            .correlate(&child(WorkflowState::Complete, "43", ""))
            .await
            .unwrap();
        assert!(again.is_none());
        let stored = client.get::<RunSpec>(&run.key()).await.unwrap();
        assert_eq!(stored.spec.result("child"), Some("42"));
        assert_eq!(stored.metadata.resource_version, run.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_delivers_error_message() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        waiting_run(&client, "child").await;

        let run = Correlator::new(client)
            .correlate(&child(WorkflowState::Error, "", "boom"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.spec.result("child"), Some("boom"));
    }

    #[tokio::test]
    async fn test_skips_unrelated_or_unfinished() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        waiting_run(&client, "someone-else").await;
        let correlator = Correlator::new(client.clone());

        assert!(correlator
            .correlate(&child(WorkflowState::Complete, "42", ""))
            .await
            .unwrap()
            .is_none());
        assert!(correlator
            .correlate(&child(WorkflowState::Running, "", ""))
            .await
            .unwrap()
            .is_none());

        let mut orphan = child(WorkflowState::Complete, "42", "");
        orphan.spec.run_name = "missing".to_string();
        assert!(correlator.correlate(&orphan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recorded_result_is_kept_after_pending_call_moves() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let mut run = waiting_run(&client, "next-call").await;
        run.spec.record_result("child", "first");
        let run = client.update(&run).await.unwrap();

        let delivered = Correlator::new(client.clone())
            .correlate(&child(WorkflowState::Complete, "second", ""))
            .await
            .unwrap();
        assert!(delivered.is_none());

        let stored = client.get::<RunSpec>(&run.key()).await.unwrap();
        assert_eq!(stored.spec.result("child"), Some("first"));
        assert_eq!(stored.metadata.resource_version, run.metadata.resource_version);
    }
}
