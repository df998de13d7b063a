//! Workflow executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meta::{Condition, Object, ResourceSpec};
use super::workflow::WorkflowManifest;

/// One run of a workflow template.
pub type WorkflowExecution = Object<WorkflowExecutionSpec>;

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    #[default]
    Pending,
    Running,
    /// Waiting on an external asynchronous result.
    Blocked,
    Complete,
    Error,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Blocked)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Blocked => write!(f, "Blocked"),
            Self::Complete => write!(f, "Complete"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Caller-supplied description of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input: String,

    pub workflow_name: String,

    /// Step of an enclosing run this execution continues after.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub after_workflow_step_name: String,

    /// Explicit execution context; overrides the template default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_name: String,

    /// Run waiting on this execution's result as an external call.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_name: String,

    /// Template generation this execution should run against.
    #[serde(default)]
    pub workflow_generation: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub webhook_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email_receiver_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron_job_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_name: String,
}

/// Engine-owned progress of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionStatus {
    #[serde(default)]
    pub state: WorkflowState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_name: String,

    /// Copy of the template manifest this run executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_manifest: Option<WorkflowManifest>,

    /// Spec generation the manifest copy was taken for.
    #[serde(default)]
    pub manifest_generation: i64,

    /// Last spec generation whose outcome was applied.
    #[serde(default)]
    pub workflow_generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ResourceSpec for WorkflowExecutionSpec {
    type Status = WorkflowExecutionStatus;
    const KIND: &'static str = "WorkflowExecution";
}
