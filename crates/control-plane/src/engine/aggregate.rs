//! Step state aggregation.
//!
//! Folds the observed states of a chain into one execution-level state and
//! decides how much of the chain may exist. Steps after the first
//! non-complete step are never materialized.

use tracing::debug;

use crate::api::{ObjectKey, RunSpec, StepState, WorkflowState, WorkflowStep, WorkflowStepSpec};
use crate::error::AppResult;
use crate::store::Client;

/// What was observed for one chain position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepObservation {
    pub step_id: String,
    pub state: StepState,
    pub output: String,
    pub error: String,
    /// Generation the observed state belongs to.
    pub generation: i64,
}

impl StepObservation {
    /// A step that does not exist yet.
    pub fn pending(step: &WorkflowStep) -> Self {
        Self {
            step_id: step.spec.step.id.clone(),
            generation: step.spec.workflow_generation,
            ..Default::default()
        }
    }

    fn from_step(step: &WorkflowStep) -> Self {
        Self {
            step_id: step.spec.step.id.clone(),
            state: step.status.state,
            output: step.status.output.clone(),
            error: step.status.error.clone(),
            generation: step.status.workflow_generation,
        }
    }
}

/// Result of folding a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub state: WorkflowState,
    /// Output when complete, error message on error, blocking reason when blocked.
    pub output: String,
    /// Length of the chain prefix that should exist.
    pub materialize: usize,
}

/// Fold observations for `generation` into an execution state.
///
/// Steps are walked in chain order. Complete steps carry their output
/// forward; the first step that is not complete decides the result. A state
/// recorded for another generation counts as pending.
pub fn aggregate(generation: i64, observations: &[StepObservation]) -> Aggregation {
    let mut output = String::new();

    for (index, observation) in observations.iter().enumerate() {
        let state = if observation.generation == generation {
            observation.state
        } else {
            StepState::Pending
        };
        let materialize = index + 1;

        match state {
            StepState::Complete => {
                output = observation.output.clone();
            }
            StepState::Error => {
                let message = if observation.error.is_empty() {
                    format!("step {} failed", observation.step_id)
                } else {
                    observation.error.clone()
                };
                return Aggregation {
                    state: WorkflowState::Error,
                    output: message,
                    materialize,
                };
            }
            StepState::Blocked => {
                let reason = if observation.error.is_empty() {
                    format!("step {} is waiting on an external result", observation.step_id)
                } else {
                    observation.error.clone()
                };
                return Aggregation {
                    state: WorkflowState::Blocked,
                    output: reason,
                    materialize,
                };
            }
            StepState::Pending | StepState::Running => {
                return Aggregation {
                    state: WorkflowState::Running,
                    output: String::new(),
                    materialize,
                };
            }
        }
    }

    Aggregation {
        state: WorkflowState::Complete,
        output,
        materialize: observations.len(),
    }
}

/// Read the current state of each chain step from the store.
///
/// Reading stops after the first step that is not complete; the remaining
/// positions are reported as pending since they cannot exist yet.
pub async fn observe(client: &Client, chain: &[WorkflowStep]) -> AppResult<Vec<StepObservation>> {
    let mut observations = Vec::with_capacity(chain.len());

    for (index, desired) in chain.iter().enumerate() {
        let observation = match client.find::<WorkflowStepSpec>(&desired.key()).await? {
            Some(step) => observe_step(client, &step).await?,
            None => StepObservation::pending(desired),
        };

        let done = observation.state == StepState::Complete
            && observation.generation == desired.spec.workflow_generation;
        observations.push(observation);

        if !done {
            observations.extend(chain[index + 1..].iter().map(StepObservation::pending));
            break;
        }
    }

    Ok(observations)
}

/// Observe one step, resolving a blocked step whose run already holds the
/// result it is waiting for.
async fn observe_step(client: &Client, step: &WorkflowStep) -> AppResult<StepObservation> {
    let mut observation = StepObservation::from_step(step);

    if step.status.state != StepState::Blocked || step.status.run_name.is_empty() {
        return Ok(observation);
    }

    let key = ObjectKey::new(step.namespace(), &step.status.run_name);
    let Some(run) = client.find::<RunSpec>(&key).await? else {
        return Ok(observation);
    };

    let result = run
        .status
        .pending_call_id()
        .and_then(|id| run.spec.result(id));

    if let Some(data) = result {
        debug!(
            "Step '{}' resolved by correlated result on run '{}'",
            step.spec.step.id,
            run.name()
        );
        observation.state = StepState::Complete;
        observation.output = data.to_string();
        observation.error.clear();
    }

    Ok(observation)
}
