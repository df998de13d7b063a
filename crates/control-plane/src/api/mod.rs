//! Persisted object model.
//!
//! Every object stored by the control plane is an [`Object`]: shared
//! [`ObjectMeta`] plus a kind-specific spec and status. The kinds are:
//!
//! - [`Workflow`]: the template an execution runs
//! - [`WorkflowExecution`]: one run of a template
//! - [`WorkflowStep`]: one chain-linked unit of an execution
//! - [`Thread`]: the execution context steps act within
//! - [`Run`]: a single invocation record, able to wait on one external call

pub mod execution;
pub mod meta;
pub mod run;
pub mod step;
pub mod thread;
pub mod workflow;

pub use execution::{WorkflowExecution, WorkflowExecutionSpec, WorkflowExecutionStatus, WorkflowState};
pub use meta::{Condition, Object, ObjectKey, ObjectMeta, OwnerReference, ResourceSpec};
pub use run::{ExternalCall, Run, RunSpec, RunState, RunStatus};
pub use step::{StepState, WorkflowStep, WorkflowStepSpec, WorkflowStepStatus};
pub use thread::{EnvVar, Thread, ThreadSpec, ThreadStatus};
pub use workflow::{ManifestError, Step, StepKind, Workflow, WorkflowManifest, WorkflowSpec};
