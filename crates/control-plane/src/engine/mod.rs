//! Workflow execution engine.
//!
//! The engine is level-triggered: each pass reads the current state of an
//! execution and everything it depends on, then converges. Nothing is
//! carried between passes except what is persisted.
//!
//! - **Chain**: Builds the deterministic step chain from a manifest
//! - **Aggregate**: Folds step states into an execution state
//! - **Thread**: Creates and maintains the execution's thread
//! - **Reconciler**: Drives an execution toward completion
//! - **Correlator**: Hands nested execution results to waiting runs
//! - **Reassign**: Inherits the template's project thread
//! - **Gc**: Deletes threads and steps of deleted executions

pub mod aggregate;
pub mod apply;
pub mod chain;
pub mod correlator;
pub mod gc;
pub mod reassign;
pub mod reconciler;
pub mod thread;

pub use aggregate::{aggregate, observe, Aggregation, StepObservation};
pub use apply::{Apply, ApplyStats};
pub use chain::build_chain;
pub use correlator::Correlator;
pub use gc::Collector;
pub use reassign::Reassigner;
pub use reconciler::Reconciler;
pub use thread::{normalize_input, ThreadManager};

use tracing::debug;

use crate::api::{Condition, ObjectKey, WorkflowExecutionSpec};
use crate::error::{AppError, AppResult};
use crate::store::Client;

/// Condition recording the outcome of the last pass.
pub const RECONCILED_CONDITION: &str = "Reconciled";

/// Runs every execution handler in order for one key.
#[derive(Clone)]
pub struct Engine {
    client: Client,
    reassigner: Reassigner,
    reconciler: Reconciler,
    correlator: Correlator,
    collector: Collector,
}

impl Engine {
    pub fn new(client: Client) -> Self {
        Self {
            reassigner: Reassigner::new(client.clone()),
            reconciler: Reconciler::new(client.clone()),
            correlator: Correlator::new(client.clone()),
            collector: Collector::new(client.clone()),
            client,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// One full pass over the execution stored at `key`.
    ///
    /// Handlers run in order: thread reassignment, reconciliation, then
    /// correlation. The status is written only when the pass changed it. For
    /// a deleted execution the pass deletes the thread and steps it owned.
    pub async fn sync(&self, key: &ObjectKey) -> AppResult<()> {
        let Some(mut execution) = self.client.find::<WorkflowExecutionSpec>(key).await? else {
            debug!("Execution {} no longer exists", key);
            self.collector.collect(key).await?;
            return Ok(());
        };

        self.reassigner.reassign(&mut execution).await?;

        let before = execution.status.clone();
        self.reconciler.reconcile(&mut execution).await?;
        Condition::set(
            &mut execution.status.conditions,
            RECONCILED_CONDITION,
            true,
            "",
            "",
        );
        if execution.status != before {
            execution = self.client.update_status(&execution).await?;
        }

        self.correlator.correlate(&execution).await?;

        Ok(())
    }

    /// Record a failed pass on the execution's conditions.
    ///
    /// Best effort: a concurrent write wins and the next pass records again.
    pub async fn record_failure(&self, key: &ObjectKey, error: &AppError) -> AppResult<()> {
        let Some(mut execution) = self.client.find::<WorkflowExecutionSpec>(key).await? else {
            return Ok(());
        };

        let changed = Condition::set(
            &mut execution.status.conditions,
            RECONCILED_CONDITION,
            false,
            "ReconcileError",
            &error.to_string(),
        );
        if changed {
            match self.client.update_status(&execution).await {
                Ok(_) => {}
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
