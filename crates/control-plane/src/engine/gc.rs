//! Cleanup of objects left behind by deleted executions.
//!
//! Threads and steps carry an owner reference to their execution. Once the
//! execution is gone they are deleted; the project thread an execution ran
//! under has no such reference and stays.

use tracing::info;

use crate::api::{ObjectKey, ResourceSpec, ThreadSpec, WorkflowExecutionSpec, WorkflowStepSpec};
use crate::error::{ignore_not_found, AppResult};
use crate::store::Client;

#[derive(Clone)]
pub struct Collector {
    client: Client,
}

impl Collector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Delete every step and thread owned by the execution at `key`.
    ///
    /// Callers must have seen the execution missing. Returns the number of
    /// objects deleted.
    pub async fn collect(&self, key: &ObjectKey) -> AppResult<usize> {
        let steps = self.delete_owned::<WorkflowStepSpec>(key).await?;
        let threads = self.delete_owned::<ThreadSpec>(key).await?;

        if steps + threads > 0 {
            info!(
                "Collected {} steps and {} threads of deleted execution {}",
                steps, threads, key
            );
        }
        Ok(steps + threads)
    }

    async fn delete_owned<S: ResourceSpec>(&self, key: &ObjectKey) -> AppResult<usize> {
        let owned: Vec<ObjectKey> = self
            .client
            .list::<S>(Some(&key.namespace))
            .await?
            .into_iter()
            .filter(|o| o.metadata.owner_name(WorkflowExecutionSpec::KIND) == Some(key.name.as_str()))
            .map(|o| o.key())
            .collect();

        for child in &owned {
            ignore_not_found(self.client.delete::<S>(child).await)?;
        }
        Ok(owned.len())
    }
}

/// Executions that own threads or steps but no longer exist.
pub async fn missing_owners(client: &Client) -> AppResult<Vec<ObjectKey>> {
    let mut owners: Vec<ObjectKey> = Vec::new();

    let steps = client.list::<WorkflowStepSpec>(None).await?;
    let threads = client.list::<ThreadSpec>(None).await?;
    let referenced = steps
        .iter()
        .map(|s| &s.metadata)
        .chain(threads.iter().map(|t| &t.metadata))
        .filter_map(|meta| {
            meta.owner_name(WorkflowExecutionSpec::KIND)
                .map(|owner| ObjectKey::new(&meta.namespace, owner))
        });

    for key in referenced {
        if owners.contains(&key) {
            continue;
        }
        if client.find::<WorkflowExecutionSpec>(&key).await?.is_none() {
            owners.push(key);
        }
    }

    Ok(owners)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{Step, Thread, WorkflowExecution, WorkflowStep};
    use crate::store::MemoryStore;

    async fn setup() -> (Client, WorkflowExecution) {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let execution = client
            .create(&WorkflowExecution::new(
                "default",
                "we1",
                WorkflowExecutionSpec::default(),
            ))
            .await
            .unwrap();

        let mut step = WorkflowStep::new(
            "default",
            "wfs1a",
            WorkflowStepSpec {
                workflow_execution_name: "we1".to_string(),
                step: Step::prompt("a", "x"),
                ..Default::default()
            },
        );
        step.metadata.owner_references = vec![execution.owner_reference()];
        client.create(&step).await.unwrap();

        let mut thread = Thread::new(
            "default",
            "t1a",
            ThreadSpec {
                workflow_execution_name: "we1".to_string(),
                ..Default::default()
            },
        );
        thread.metadata.owner_references = vec![execution.owner_reference()];
        client.create(&thread).await.unwrap();

        client
            .create(&Thread::new("default", "project", ThreadSpec::default()))
            .await
            .unwrap();

        (client, execution)
    }

    #[tokio::test]
    async fn test_collect_deletes_owned_children_only() {
        let (client, execution) = setup().await;
        client
            .delete::<WorkflowExecutionSpec>(&execution.key())
            .await
            .unwrap();

        assert_eq!(missing_owners(&client).await.unwrap(), vec![execution.key()]);

        let collector = Collector::new(client.clone());
        assert_eq!(collector.collect(&execution.key()).await.unwrap(), 2);

        assert!(client.list::<WorkflowStepSpec>(None).await.unwrap().is_empty());
        let threads = client.list::<ThreadSpec>(None).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].name(), "project");

        assert_eq!(collector.collect(&execution.key()).await.unwrap(), 0);
        assert!(missing_owners(&client).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_owner_is_not_missing() {
        let (client, _) = setup().await;
        assert!(missing_owners(&client).await.unwrap().is_empty());
    }
}
