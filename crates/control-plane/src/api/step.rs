//! Step objects materialized for an execution.

use serde::{Deserialize, Serialize};

use super::meta::{Object, ResourceSpec};
use super::workflow::Step;

/// One chain-linked step of an execution.
pub type WorkflowStep = Object<WorkflowStepSpec>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    #[default]
    Pending,
    Running,
    Blocked,
    Complete,
    Error,
}

impl std::fmt::Display for StepState {
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

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepSpec {
    pub workflow_execution_name: String,

    /// Name of the step this one runs after; empty for the first step.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub after_workflow_step_name: String,

    #[serde(default)]
    pub workflow_generation: i64,

    pub step: Step,
}

/// Written by the step executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepStatus {
    #[serde(default)]
    pub state: StepState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// Run performing this step's underlying call.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_name: String,

    /// Generation the state above was produced for.
    #[serde(default)]
    pub workflow_generation: i64,
}

impl ResourceSpec for WorkflowStepSpec {
    type Status = WorkflowStepStatus;
    const KIND: &'static str = "WorkflowStep";
}
