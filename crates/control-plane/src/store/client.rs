//! Typed access to a [`Store`].

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::{Object, ObjectKey, ResourceSpec};
use crate::error::{ignore_not_found, AppResult};

use super::{RawObject, Store, WatchEvent};

/// Cheaply clonable typed client over a shared store.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Store>,
}

impl Client {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn get<S: ResourceSpec>(&self, key: &ObjectKey) -> AppResult<Object<S>> {
        let raw = self.store.get(S::KIND, key).await?;
        from_raw(raw)
    }

    /// Like [`Client::get`], with a missing object mapped to `None`.
    pub async fn find<S: ResourceSpec>(&self, key: &ObjectKey) -> AppResult<Option<Object<S>>> {
        ignore_not_found(self.get(key).await)
    }

    pub async fn list<S: ResourceSpec>(&self, namespace: Option<&str>) -> AppResult<Vec<Object<S>>> {
        self.store
            .list(S::KIND, namespace)
            .await?
            .into_iter()
            .map(from_raw)
            .collect()
    }

    pub async fn create<S: ResourceSpec>(&self, object: &Object<S>) -> AppResult<Object<S>> {
        let raw = self.store.create(to_raw(object)?).await?;
        from_raw(raw)
    }

    pub async fn update<S: ResourceSpec>(&self, object: &Object<S>) -> AppResult<Object<S>> {
        let raw = self.store.update(to_raw(object)?).await?;
        from_raw(raw)
    }

    pub async fn update_status<S: ResourceSpec>(&self, object: &Object<S>) -> AppResult<Object<S>> {
        let raw = self.store.update_status(to_raw(object)?).await?;
        from_raw(raw)
    }

    pub async fn delete<S: ResourceSpec>(&self, key: &ObjectKey) -> AppResult<()> {
        self.store.delete(S::KIND, key).await?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.store.subscribe()
    }
}

pub fn to_raw<S: ResourceSpec>(object: &Object<S>) -> AppResult<RawObject> {
    Ok(RawObject {
        kind: S::KIND.to_string(),
        metadata: object.metadata.clone(),
        spec: serde_json::to_value(&object.spec)?,
        status: serde_json::to_value(&object.status)?,
    })
}

pub fn from_raw<S: ResourceSpec>(raw: RawObject) -> AppResult<Object<S>> {
    let status = if raw.status.is_null() {
        S::Status::default()
    } else {
        serde_json::from_value(raw.status)?
    };

    Ok(Object {
        metadata: raw.metadata,
        spec: serde_json::from_value(raw.spec)?,
        status,
    })
}
