//! Workflow templates and step definitions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::meta::{Object, ResourceSpec};

/// Step id reserved for the synthetic trailing output step.
pub const OUTPUT_STEP_ID: &str = "output";

/// A workflow template.
pub type Workflow = Object<WorkflowSpec>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    #[serde(default)]
    pub manifest: WorkflowManifest,

    /// Default ("project") execution context inherited by executions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {}

impl ResourceSpec for WorkflowSpec {
    type Status = WorkflowStatus;
    const KIND: &'static str = "Workflow";
}

/// The ordered description of what a workflow does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    /// Expression producing the workflow output, evaluated after the last step.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

/// Malformed manifest content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("step {index} has an empty id")]
    EmptyStepId { index: usize },

    #[error("step id {0:?} is used more than once")]
    DuplicateStepId(String),

    #[error("step id \"output\" is reserved")]
    ReservedStepId,

    #[error("step {id:?} of kind {kind} has no content")]
    EmptyContent { id: String, kind: &'static str },

    #[error("step {0:?}: output steps cannot be declared in a manifest")]
    OutputStepDeclared(String),
}

impl WorkflowManifest {
    /// Check the manifest before any step is built from it.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(ManifestError::EmptyStepId { index });
            }
            if step.id == OUTPUT_STEP_ID {
                return Err(ManifestError::ReservedStepId);
            }
            if !seen.insert(step.id.as_str()) {
                return Err(ManifestError::DuplicateStepId(step.id.clone()));
            }
            if matches!(step.kind, StepKind::Output { .. }) {
                return Err(ManifestError::OutputStepDeclared(step.id.clone()));
            }
            if step.kind.content().trim().is_empty() {
                return Err(ManifestError::EmptyContent {
                    id: step.id.clone(),
                    kind: step.kind.name(),
                });
            }
        }

        Ok(())
    }

    /// Whether a trailing output step is part of the chain.
    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }
}

/// One entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,

    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn prompt(id: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Prompt { step: step.into() },
        }
    }

    /// The synthetic step evaluating the manifest's output expression.
    pub fn output(expression: impl Into<String>) -> Self {
        Self {
            id: OUTPUT_STEP_ID.to_string(),
            kind: StepKind::Output {
                expression: expression.into(),
            },
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Step::prompt("", "")
    }
}

/// Closed set of step kinds.
///
/// The engine only sequences and observes steps; what a kind does is up
/// to the step executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepKind {
    /// Instruction handed to the thread's agent.
    Prompt { step: String },

    /// Direct invocation of a named tool.
    Tool {
        tool: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        args: BTreeMap<String, String>,
    },

    /// Nested workflow, run as a child execution and correlated back
    /// through the calling Run's external call.
    Workflow {
        workflow: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        input: String,
    },

    /// Output expression appended by the chain builder.
    Output { expression: String },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Prompt { .. } => "prompt",
            StepKind::Tool { .. } => "tool",
            StepKind::Workflow { .. } => "workflow",
            StepKind::Output { .. } => "output",
        }
    }

    /// The text that defines what the step does.
    pub fn content(&self) -> &str {
        match self {
            StepKind::Prompt { step } => step,
            StepKind::Tool { tool, .. } => tool,
            StepKind::Workflow { workflow, .. } => workflow,
            StepKind::Output { expression } => expression,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(steps: Vec<Step>) -> WorkflowManifest {
        WorkflowManifest {
            steps,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_manifest() {
        let m = manifest(vec![Step::prompt("a", "do a"), Step::prompt("b", "do b")]);
        assert_eq!(m.validate(), Ok(()));
    }

    #[test]
    fn test_duplicate_step_id() {
        let m = manifest(vec![Step::prompt("a", "x"), Step::prompt("a", "y")]);
        assert_eq!(
            m.validate(),
            Err(ManifestError::DuplicateStepId("a".to_string()))
        );
    }

    #[test]
    fn test_reserved_and_empty() {
        let m = manifest(vec![Step::prompt("output", "x")]);
        assert_eq!(m.validate(), Err(ManifestError::ReservedStepId));

        let m = manifest(vec![Step::prompt(" ", "x")]);
        assert_eq!(m.validate(), Err(ManifestError::EmptyStepId { index: 0 }));

        let m = manifest(vec![Step::prompt("a", "")]);
        assert!(matches!(
            m.validate(),
            Err(ManifestError::EmptyContent { kind: "prompt", .. })
        ));
    }

    #[test]
    fn test_has_output_only_checks_empty() {
        let mut m = manifest(vec![Step::prompt("a", "x")]);
        assert!(!m.has_output());

        m.output = " ".to_string();
        assert!(m.has_output());
    }

    #[test]
    fn test_step_kind_tagging() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "id": "fetch",
            "kind": "tool",
            "tool": "http-get",
            "args": {"url": "https://example.com"}
        }))
        .unwrap();

        assert_eq!(step.kind.name(), "tool");
        assert_eq!(step.kind.content(), "http-get");

        let value = serde_json::to_value(Step::prompt("a", "hello")).unwrap();
        assert_eq!(value["kind"], "prompt");
        assert_eq!(value["step"], "hello");
    }

    #[test]
    fn test_manifest_from_yaml() {
        let m: WorkflowManifest = serde_yaml::from_str(
            r#"
steps:
  - id: a
    kind: prompt
    step: summarize the input
  - id: b
    kind: workflow
    workflow: child
output: b.result
"#,
        )
        .unwrap();

        assert_eq!(m.steps.len(), 2);
        assert!(m.has_output());
        assert_eq!(m.validate(), Ok(()));
    }
}
