//! Thread lifecycle for executions.
//!
//! Every execution gets exactly one Thread. Its name is derived from the
//! execution's uid, so concurrent reconciles racing to create it converge on
//! the same object: whoever loses the create adopts the winner's thread.

use tracing::{debug, info};
use uuid::Uuid;

use crate::api::thread::{INPUT_ENV, WORKSPACE_ENV};
use crate::api::{ObjectKey, Thread, ThreadSpec, Workflow, WorkflowExecution};
use crate::error::{AppError, AppResult};
use crate::store::Client;

/// Prefix of generated thread names.
pub const THREAD_PREFIX: &str = "t1";

const THREAD_NAMESPACE: Uuid = Uuid::from_u128(0x1d8e_54b2_0c6f_4f37_a9e4_3b7c_52d1_e08a);

/// Thread name for an execution.
pub fn thread_name_for(execution: &WorkflowExecution) -> String {
    let seed = format!(
        "{}/{}/{}",
        execution.namespace(),
        execution.name(),
        execution.metadata.uid
    );
    let id = Uuid::new_v5(&THREAD_NAMESPACE, seed.as_bytes());
    format!("{THREAD_PREFIX}{}", id.simple())
}

/// Value exported as the thread's input.
///
/// The input is opaque: empty input becomes `{}`, anything else is passed
/// through byte for byte.
pub fn normalize_input(input: &str) -> String {
    if input.is_empty() {
        "{}".to_string()
    } else {
        input.to_string()
    }
}

#[derive(Clone)]
pub struct ThreadManager {
    client: Client,
}

impl ThreadManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Make sure `execution` has a thread carrying its current input.
    ///
    /// Creates and records the thread when none is recorded, then brings
    /// the thread's environment in line with the execution. Returns `None`
    /// when the thread cannot exist yet (missing project thread) or has
    /// been deleted; the caller stops for this pass.
    pub async fn ensure(
        &self,
        execution: &mut WorkflowExecution,
        workflow: &Workflow,
    ) -> AppResult<Option<Thread>> {
        if execution.status.thread_name.is_empty() && !self.create(execution, workflow).await? {
            return Ok(None);
        }
        self.sync(execution).await
    }

    /// Create or adopt the execution's thread and record it on the status.
    async fn create(&self, execution: &mut WorkflowExecution, workflow: &Workflow) -> AppResult<bool> {
        let project_name = if execution.spec.thread_name.is_empty() {
            workflow.spec.thread_name.as_str()
        } else {
            execution.spec.thread_name.as_str()
        };

        let parent = if project_name.is_empty() {
            None
        } else {
            let key = ObjectKey::new(execution.namespace(), project_name);
            match self.client.find::<ThreadSpec>(&key).await? {
                Some(project) => Some(project),
                None => {
                    debug!(
                        "Project thread '{}' for execution {} not found, waiting",
                        project_name,
                        execution.key()
                    );
                    return Ok(false);
                }
            }
        };

        let name = thread_name_for(execution);
        let key = ObjectKey::new(execution.namespace(), &name);

        let thread = match self.client.find::<ThreadSpec>(&key).await? {
            Some(existing) => existing,
            None => {
                let desired = self.desired(execution, workflow, parent.as_ref(), &name);
                match self.client.create(&desired).await {
                    Ok(created) => {
                        info!("Created thread {} for execution {}", created.key(), execution.key());
                        created
                    }
                    Err(e) if e.is_already_exists() => self.client.get(&key).await?,
                    Err(e) => return Err(e),
                }
            }
        };

        if thread.spec.workflow_execution_name != execution.name() {
            return Err(AppError::Conflict(format!(
                "thread {} belongs to execution {}",
                thread.key(),
                thread.spec.workflow_execution_name
            )));
        }

        execution.status.thread_name = thread.name().to_string();
        *execution = self.client.update_status(execution).await?;

        Ok(true)
    }

    fn desired(
        &self,
        execution: &WorkflowExecution,
        workflow: &Workflow,
        parent: Option<&Thread>,
        name: &str,
    ) -> Thread {
        let mut spec = ThreadSpec {
            parent_thread_name: parent.map(|p| p.name().to_string()).unwrap_or_default(),
            agent_name: parent.map(|p| p.spec.agent_name.clone()).unwrap_or_default(),
            user_id: parent.map(|p| p.spec.user_id.clone()).unwrap_or_default(),
            workflow_name: workflow.name().to_string(),
            workflow_execution_name: execution.name().to_string(),
            webhook_name: execution.spec.webhook_name.clone(),
            email_receiver_name: execution.spec.email_receiver_name.clone(),
            cron_job_name: execution.spec.cron_job_name.clone(),
            env: Vec::new(),
        };
        apply_env(&mut spec, execution);

        let mut thread = Thread::new(execution.namespace(), name, spec);
        thread.metadata.owner_references = vec![execution.owner_reference()];
        thread
    }

    /// Bring the recorded thread's environment up to date.
    async fn sync(&self, execution: &WorkflowExecution) -> AppResult<Option<Thread>> {
        let key = ObjectKey::new(execution.namespace(), &execution.status.thread_name);
        let Some(mut thread) = self.client.find::<ThreadSpec>(&key).await? else {
            debug!("Thread {} of execution {} is gone", key, execution.key());
            return Ok(None);
        };

        if apply_env(&mut thread.spec, execution) {
            debug!("Updating environment of thread {}", key);
            thread = self.client.update(&thread).await?;
        }

        Ok(Some(thread))
    }
}

fn apply_env(spec: &mut ThreadSpec, execution: &WorkflowExecution) -> bool {
    let mut changed = spec.set_env(INPUT_ENV, &normalize_input(&execution.spec.input));
    if !execution.spec.workspace_name.is_empty() {
        changed |= spec.set_env(WORKSPACE_ENV, &execution.spec.workspace_name);
    }
    changed
}
