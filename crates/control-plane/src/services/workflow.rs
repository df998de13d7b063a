//! Workflow template management.

use tracing::info;

use crate::api::{ObjectKey, Workflow, WorkflowSpec};
use crate::error::{AppError, AppResult};
use crate::store::Client;

#[derive(Clone)]
pub struct WorkflowService {
    client: Client,
}

impl WorkflowService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, key: &ObjectKey) -> AppResult<Workflow> {
        self.client.get(key).await
    }

    /// Create the workflow or replace the spec of the existing one.
    ///
    /// The manifest is validated first. Replacing the spec bumps the
    /// template generation only when the content actually changed.
    pub async fn upsert(&self, key: &ObjectKey, spec: WorkflowSpec) -> AppResult<Workflow> {
        if key.namespace.is_empty() || key.name.is_empty() {
            return Err(AppError::BadRequest(
                "workflow namespace and name are required".to_string(),
            ));
        }
        spec.manifest.validate()?;

        match self.client.find::<WorkflowSpec>(key).await? {
            Some(mut existing) => {
                if existing.spec == spec {
                    return Ok(existing);
                }
                existing.spec = spec;
                let updated = self.client.update(&existing).await?;
                info!(
                    "Updated workflow {} to generation {}",
                    key, updated.metadata.generation
                );
                Ok(updated)
            }
            None => {
                let created = self
                    .client
                    .create(&Workflow::new(&key.namespace, &key.name, spec))
                    .await?;
                info!("Created workflow {}", key);
                Ok(created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{Step, WorkflowManifest};
    use crate::store::MemoryStore;

    fn spec(prompt: &str) -> WorkflowSpec {
        WorkflowSpec {
            manifest: WorkflowManifest {
                steps: vec![Step::prompt("a", prompt)],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_bumps_generation_only_on_change() {
        let service = WorkflowService::new(Client::new(Arc::new(MemoryStore::new())));
        let key = ObjectKey::new("default", "wf");

        let created = service.upsert(&key, spec("x")).await.unwrap();
        assert_eq!(created.metadata.generation, 1);

        let same = service.upsert(&key, spec("x")).await.unwrap();
        assert_eq!(same.metadata.generation, 1);
        assert_eq!(same.metadata.resource_version, created.metadata.resource_version);

        let changed = service.upsert(&key, spec("y")).await.unwrap();
        assert_eq!(changed.metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_manifest() {
        let service = WorkflowService::new(Client::new(Arc::new(MemoryStore::new())));
        let err = service
            .upsert(&ObjectKey::new("default", "wf"), spec(""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
