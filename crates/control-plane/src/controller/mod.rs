//! Controller runtime.
//!
//! Feeds execution keys from the store's change feed into a deduplicating
//! [`WorkQueue`] and runs a pool of workers that call [`Engine::sync`] for
//! each key. A pass that hits a write conflict is re-run immediately from a
//! fresh read; any other failure is requeued with exponential backoff.

pub mod queue;
pub mod triggers;

pub use queue::WorkQueue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ObjectKey, WorkflowExecutionSpec};
use crate::config::AppConfig;
use crate::engine::{gc, Engine};
use crate::error::AppResult;
use crate::result_ext::ResultExt;
use crate::store::{Client, WatchEvent};

/// Worker pool and retry settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub workers: usize,
    pub max_conflict_retries: u32,
    pub requeue_base: Duration,
    pub requeue_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ControllerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_conflict_retries: config.max_conflict_retries,
            requeue_base: config.requeue_base(),
            requeue_max: config.requeue_max(),
        }
    }
}

impl ControllerConfig {
    /// Requeue delay after `failures` consecutive failed passes.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.requeue_base
            .saturating_mul(factor)
            .min(self.requeue_max)
    }
}

pub struct Controller {
    engine: Engine,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

/// Running controller tasks.
pub struct ControllerHandle {
    queue: Arc<WorkQueue>,
    watcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Stop the watcher and wait for workers to finish their current pass.
    pub async fn shutdown(self) {
        self.watcher.abort();
        self.queue.shutdown().await;
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("Controller stopped");
    }
}

impl Controller {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            engine: Engine::new(client),
            queue: Arc::new(WorkQueue::new()),
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Subscribe to the change feed, enqueue every existing execution and
    /// spawn the workers.
    pub async fn start(self: Arc<Self>) -> AppResult<ControllerHandle> {
        let events = self.engine.client().subscribe();
        self.resync().await?;

        let watcher = tokio::spawn(Arc::clone(&self).watch(events));
        let workers = (0..self.config.workers)
            .map(|id| tokio::spawn(Arc::clone(&self).work(id)))
            .collect();

        info!("Controller started with {} workers", self.config.workers);

        Ok(ControllerHandle {
            queue: self.queue(),
            watcher,
            workers,
        })
    }

    /// Enqueue every execution in the store, and every deleted execution
    /// whose threads or steps are still around.
    pub async fn resync(&self) -> AppResult<()> {
        let client = self.engine.client();
        let executions = client.list::<WorkflowExecutionSpec>(None).await?;
        let orphaned = gc::missing_owners(client).await?;
        debug!(
            "Resyncing {} executions and {} deleted executions",
            executions.len(),
            orphaned.len()
        );

        for execution in executions {
            self.queue.add(execution.key()).await;
        }
        for key in orphaned {
            self.queue.add(key).await;
        }
        Ok(())
    }

    async fn watch(self: Arc<Self>, mut events: broadcast::Receiver<WatchEvent>) {
        loop {
            match events.recv().await {
                Ok(event) if event.is_resync() => {
                    info!("Change feed recovered, resyncing");
                    let _ = self.resync().await.log("resync after feed recovery");
                }
                Ok(event) => {
                    let keys = triggers::keys_for(self.engine.client(), &event)
                        .await
                        .log(format!("mapping {} event for {}", event.kind, event.key));
                    for key in keys.unwrap_or_default() {
                        self.queue.add(key).await;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Change feed lagged by {} events, resyncing", missed);
                    let _ = self.resync().await.log("resync after lag");
                }
                Err(RecvError::Closed) => {
                    debug!("Change feed closed");
                    break;
                }
            }
        }
    }

    async fn work(self: Arc<Self>, id: usize) {
        debug!("Worker {} started", id);
        while let Some(key) = self.queue.next().await {
            self.process(&key).await;
            self.queue.done(&key).await;
        }
        debug!("Worker {} stopped", id);
    }

    /// Run one key to completion of a pass, retrying on conflicts.
    pub async fn process(&self, key: &ObjectKey) {
        let mut conflicts = 0;

        loop {
            match self.engine.sync(key).await {
                Ok(()) => {
                    self.failures.lock().await.remove(key);
                    return;
                }
                Err(e) if (e.is_conflict() || e.is_already_exists())
                    && conflicts < self.config.max_conflict_retries =>
                {
                    conflicts += 1;
                    debug!("Conflict reconciling {} (attempt {}): {}", key, conflicts, e);
                }
                Err(e) => {
                    let failures = {
                        let mut failures = self.failures.lock().await;
                        let count = failures.entry(key.clone()).or_insert(0);
                        *count += 1;
                        *count
                    };
                    let delay = self.config.backoff(failures);
                    if e.is_conflict() {
                        warn!("Reconciling {} kept conflicting, requeue in {:?}", key, delay);
                    } else {
                        error!("Reconciling {} failed, requeue in {:?}: {}", key, delay, e);
                        let _ = self
                            .engine
                            .record_failure(key, &e)
                            .await
                            .log("recording reconcile failure");
                    }
                    self.queue.add_after(key.clone(), delay);
                    return;
                }
            }
        }
    }
}
