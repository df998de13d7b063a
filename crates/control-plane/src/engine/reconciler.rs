//! WorkflowExecution reconciliation.
//!
//! One pass reads the execution's template, snapshots its manifest, makes
//! sure the thread exists, rebuilds the step chain, folds the observed step
//! states and converges the owned steps. Status changes are made on the
//! in-memory execution; persisting them is the caller's job.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::api::{ObjectKey, Workflow, WorkflowExecution, WorkflowSpec, WorkflowState};
use crate::error::AppResult;
use crate::store::Client;

use super::aggregate::{aggregate, observe};
use super::apply::Apply;
use super::chain::build_chain;
use super::thread::ThreadManager;

#[derive(Clone)]
pub struct Reconciler {
    client: Client,
    threads: ThreadManager,
    apply: Apply,
}

impl Reconciler {
    pub fn new(client: Client) -> Self {
        Self {
            threads: ThreadManager::new(client.clone()),
            apply: Apply::new(client.clone()),
            client,
        }
    }

    /// Drive `execution` one step closer to its desired state.
    #[instrument(skip_all, fields(execution = %execution.key()))]
    pub async fn reconcile(&self, execution: &mut WorkflowExecution) -> AppResult<()> {
        if execution.status.state.is_terminal() {
            reset_for_rerun(execution);
            return Ok(());
        }

        let key = ObjectKey::new(execution.namespace(), &execution.spec.workflow_name);
        let Some(workflow) = self.client.find::<WorkflowSpec>(&key).await? else {
            debug!("Workflow {} not found, waiting", key);
            return Ok(());
        };

        snapshot_manifest(execution, &workflow);
        let manifest = execution.status.workflow_manifest.clone().unwrap_or_default();

        if let Err(e) = manifest.validate() {
            warn!("Invalid manifest for workflow {}: {}", key, e);
            let status = &mut execution.status;
            status.state = WorkflowState::Error;
            status.error = e.to_string();
            status.workflow_generation = execution.spec.workflow_generation;
            status.end_time.get_or_insert_with(Utc::now);
            return Ok(());
        }

        if self.threads.ensure(execution, &workflow).await?.is_none() {
            return Ok(());
        }

        let generation = execution.spec.workflow_generation;
        let mut chain = build_chain(execution.namespace(), execution.name(), &manifest, generation)?;
        let observations = observe(&self.client, &chain).await?;
        let result = aggregate(generation, &observations);
        chain.truncate(result.materialize);

        let status = &mut execution.status;
        match result.state {
            WorkflowState::Blocked => {
                // Blocked is transient: the generation is not recorded until
                // the chain settles.
                status.state = WorkflowState::Blocked;
                status.error = result.output;
            }
            state => {
                match state {
                    WorkflowState::Complete => {
                        status.output = result.output;
                        status.error.clear();
                    }
                    WorkflowState::Error => status.error = result.output,
                    _ => status.error.clear(),
                }
                if status.state != state {
                    info!("Execution {} is now {}", execution.metadata.key(), state);
                }
                status.state = state;
                status.workflow_generation = generation;
                if state.is_terminal() {
                    status.end_time.get_or_insert_with(Utc::now);
                }
            }
        }

        self.apply.apply(execution, chain).await?;

        Ok(())
    }
}

/// Reset a finished execution whose spec moved to a new generation.
fn reset_for_rerun(execution: &mut WorkflowExecution) {
    if execution.status.workflow_generation == execution.spec.workflow_generation {
        return;
    }

    info!(
        "Re-running execution {} at generation {}",
        execution.key(),
        execution.spec.workflow_generation
    );
    let status = &mut execution.status;
    status.state = WorkflowState::Pending;
    status.end_time = None;
    status.output.clear();
    status.error.clear();
}

/// Take a fresh copy of the template manifest when the spec generation moved.
fn snapshot_manifest(execution: &mut WorkflowExecution, workflow: &Workflow) {
    let generation = execution.spec.workflow_generation;
    let status = &mut execution.status;

    if status.workflow_manifest.is_some() && status.manifest_generation == generation {
        return;
    }

    debug!(
        "Snapshotting manifest of workflow {} for generation {}",
        workflow.key(),
        generation
    );
    status.workflow_manifest = Some(workflow.spec.manifest.clone());
    status.manifest_generation = generation;
}
