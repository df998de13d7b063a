//! Owned-set reconciliation.
//!
//! Makes the set of objects of one kind owned by an owner equal to a desired
//! set: missing objects are created, drifted ones updated, extra ones
//! deleted. Objects already matching the desired content are not written.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::api::{Object, ResourceSpec};
use crate::error::{ignore_not_found, AppError, AppResult};
use crate::store::Client;

/// Counts of the writes an apply performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ApplyStats {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

#[derive(Clone)]
pub struct Apply {
    client: Client,
}

impl Apply {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Converge the `S` objects owned by `owner` onto `desired`.
    ///
    /// Every desired object is placed in the owner's namespace and gets the
    /// owner reference. Creating a name held by an object the owner does not
    /// own fails with a conflict.
    pub async fn apply<O, S>(&self, owner: &Object<O>, desired: Vec<Object<S>>) -> AppResult<ApplyStats>
    where
        O: ResourceSpec,
        S: ResourceSpec,
    {
        if owner.metadata.uid.is_empty() {
            return Err(AppError::Internal(format!(
                "cannot apply children of unpersisted {} {}",
                O::KIND,
                owner.key()
            )));
        }

        let mut existing: BTreeMap<String, Object<S>> = self
            .client
            .list::<S>(Some(owner.namespace()))
            .await?
            .into_iter()
            .filter(|o| o.metadata.is_owned_by(&owner.metadata.uid))
            .map(|o| (o.metadata.name.clone(), o))
            .collect();

        let mut stats = ApplyStats::default();
        let mut wanted = HashSet::with_capacity(desired.len());

        for mut object in desired {
            object.metadata.namespace = owner.namespace().to_string();
            object.metadata.owner_references = vec![owner.owner_reference()];
            wanted.insert(object.metadata.name.clone());

            match existing.remove(&object.metadata.name) {
                Some(current) => {
                    if current.spec == object.spec
                        && current.metadata.labels == object.metadata.labels
                        && current.metadata.owner_references == object.metadata.owner_references
                    {
                        continue;
                    }
                    let mut next = current;
                    next.spec = object.spec;
                    next.metadata.labels = object.metadata.labels;
                    next.metadata.owner_references = object.metadata.owner_references;
                    self.client.update(&next).await?;
                    stats.updated += 1;
                }
                None => {
                    match self.client.create(&object).await {
                        Ok(_) => stats.created += 1,
                        Err(e) if e.is_already_exists() => {
                            return Err(AppError::Conflict(format!(
                                "{} {} exists but is not owned by {} {}",
                                S::KIND,
                                object.key(),
                                O::KIND,
                                owner.name()
                            )));
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        for (name, extra) in existing {
            if wanted.contains(&name) {
                continue;
            }
            ignore_not_found(self.client.delete::<S>(&extra.key()).await)?;
            stats.deleted += 1;
        }

        if !stats.is_noop() {
            debug!(
                "Applied {} children of {} {}: {} created, {} updated, {} deleted",
                S::KIND,
                O::KIND,
                owner.key(),
                stats.created,
                stats.updated,
                stats.deleted
            );
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{ObjectKey, Step, WorkflowExecution, WorkflowExecutionSpec, WorkflowStep, WorkflowStepSpec};
    use crate::store::MemoryStore;

    fn step(name: &str, prompt: &str) -> WorkflowStep {
        WorkflowStep::new(
            "default",
            name,
            WorkflowStepSpec {
                workflow_execution_name: "we1".to_string(),
                step: Step::prompt("a", prompt),
                ..Default::default()
            },
        )
    }

    async fn setup() -> (Client, WorkflowExecution) {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let owner = client
            .create(&WorkflowExecution::new(
                "default",
                "we1",
                WorkflowExecutionSpec {
                    workflow_name: "wf".to_string(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        (client, owner)
    }

    #[tokio::test]
    async fn test_apply_creates_then_noops() {
        let (client, owner) = setup().await;
        let apply = Apply::new(client.clone());

        let stats = apply
            .apply(&owner, vec![step("s1", "x"), step("s2", "y")])
            .await
            .unwrap();
        assert_eq!(stats.created, 2);

        let stored: Vec<WorkflowStep> = client.list(Some("default")).await.unwrap();
        assert!(stored.iter().all(|s| s.metadata.is_owned_by(&owner.metadata.uid)));

        let stats = apply
            .apply(&owner, vec![step("s1", "x"), step("s2", "y")])
            .await
            .unwrap();
        assert!(stats.is_noop());
    }

    #[tokio::test]
    async fn test_apply_updates_and_prunes() {
        let (client, owner) = setup().await;
        let apply = Apply::new(client.clone());

        apply
            .apply(&owner, vec![step("s1", "x"), step("s2", "y")])
            .await
            .unwrap();

        let stats = apply.apply(&owner, vec![step("s1", "changed")]).await.unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.deleted, 1);

        let stored: Vec<WorkflowStep> = client.list(Some("default")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].spec.step, Step::prompt("a", "changed"));
        assert_eq!(stored[0].metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_apply_leaves_unowned_objects() {
        let (client, owner) = setup().await;
        client.create(&step("foreign", "z")).await.unwrap();

        let apply = Apply::new(client.clone());
        apply.apply(&owner, Vec::<WorkflowStep>::new()).await.unwrap();
        assert!(client
            .find::<WorkflowStepSpec>(&ObjectKey::new("default", "foreign"))
            .await
            .unwrap()
            .is_some());

        let err = apply.apply(&owner, vec![step("foreign", "z")]).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
