//! Execution management service.
//!
//! Creating, listing and re-running workflow executions. The engine does
//! the rest once an execution exists.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{
    ObjectKey, Run, RunSpec, WorkflowExecution, WorkflowExecutionSpec, WorkflowSpec, WorkflowState,
};
use crate::error::{AppError, AppResult};
use crate::store::Client;

/// Prefix of generated execution names.
pub const EXECUTION_PREFIX: &str = "we1";

/// Request to start an execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExecution {
    /// Explicit name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub spec: WorkflowExecutionSpec,
}

/// Filter for listing executions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub workflow: Option<String>,
    pub state: Option<WorkflowState>,
}

impl ExecutionFilter {
    fn matches(&self, execution: &WorkflowExecution) -> bool {
        self.workflow
            .as_deref()
            .map_or(true, |w| execution.spec.workflow_name == w)
            && self.state.map_or(true, |s| execution.status.state == s)
    }
}

#[derive(Clone)]
pub struct ExecutionService {
    client: Client,
}

impl ExecutionService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Start an execution of an existing workflow.
    ///
    /// Without an explicit generation the execution runs against the
    /// template's current generation.
    pub async fn create(&self, namespace: &str, request: CreateExecution) -> AppResult<WorkflowExecution> {
        let mut spec = request.spec;
        if spec.workflow_name.is_empty() {
            return Err(AppError::BadRequest("workflowName is required".to_string()));
        }

        let workflow_key = ObjectKey::new(namespace, &spec.workflow_name);
        let workflow = self
            .client
            .find::<WorkflowSpec>(&workflow_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workflow {}", workflow_key)))?;

        if spec.workflow_generation == 0 {
            spec.workflow_generation = workflow.metadata.generation;
        }

        let mut execution = WorkflowExecution::new(namespace, request.name.unwrap_or_default(), spec);
        if execution.metadata.name.is_empty() {
            execution.metadata.generate_name = EXECUTION_PREFIX.to_string();
        }

        let created = self.client.create(&execution).await?;
        info!(
            "Created execution {} of workflow {}",
            created.key(),
            workflow_key
        );
        Ok(created)
    }

    pub async fn list(&self, namespace: &str, filter: &ExecutionFilter) -> AppResult<Vec<WorkflowExecution>> {
        let executions = self
            .client
            .list::<WorkflowExecutionSpec>(Some(namespace))
            .await?;
        Ok(executions.into_iter().filter(|e| filter.matches(e)).collect())
    }

    pub async fn get(&self, key: &ObjectKey) -> AppResult<WorkflowExecution> {
        self.client.get(key).await
    }

    /// Re-run a finished execution against the latest template.
    ///
    /// Moves `spec.workflow_generation` forward; the reconciler resets the
    /// status and builds a fresh chain for the new generation.
    pub async fn rerun(&self, key: &ObjectKey) -> AppResult<WorkflowExecution> {
        let mut execution = self.get(key).await?;
        if !execution.status.state.is_terminal() {
            return Err(AppError::Conflict(format!(
                "execution {} is {}, only finished executions can be re-run",
                key, execution.status.state
            )));
        }

        let workflow_key = ObjectKey::new(&key.namespace, &execution.spec.workflow_name);
        let template_generation = self
            .client
            .find::<WorkflowSpec>(&workflow_key)
            .await?
            .map_or(0, |w| w.metadata.generation);

        execution.spec.workflow_generation =
            (execution.spec.workflow_generation + 1).max(template_generation);
        let updated = self.client.update(&execution).await?;
        info!(
            "Re-running execution {} at generation {}",
            key, updated.spec.workflow_generation
        );
        Ok(updated)
    }

    /// Delete an execution; the engine then removes its thread and steps.
    pub async fn delete(&self, key: &ObjectKey) -> AppResult<()> {
        self.client.delete::<WorkflowExecutionSpec>(key).await?;
        info!("Deleted execution {}", key);
        Ok(())
    }

    pub async fn get_run(&self, key: &ObjectKey) -> AppResult<Run> {
        self.client.get::<RunSpec>(key).await
    }
}
