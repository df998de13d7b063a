//! In-process store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::api::ObjectKey;

use super::{
    apply_write, prepare_create, RawObject, Store, StoreError, StoreResult, WatchEvent,
    WatchEventType, WATCH_CAPACITY,
};

type Slot = (String, ObjectKey);

/// Store keeping every object in memory.
///
/// Writes are serialized by a single lock, so compare-and-swap on
/// `resource_version` behaves exactly like the database-backed store.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<Slot, RawObject>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn notify(&self, event_type: WatchEventType, object: &RawObject) {
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent::new(event_type, object.clone()));
    }

    async fn write(&self, incoming: RawObject, status_only: bool) -> StoreResult<RawObject> {
        let slot = (incoming.kind.clone(), incoming.key());
        let mut objects = self.objects.write().await;

        let current = objects.get(&slot).ok_or_else(|| StoreError::NotFound {
            kind: slot.0.clone(),
            key: slot.1.clone(),
        })?;

        match apply_write(current, incoming, status_only)? {
            Some(next) => {
                objects.insert(slot, next.clone());
                self.notify(WatchEventType::Modified, &next);
                Ok(next)
            }
            None => Ok(current.clone()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<RawObject> {
        self.objects
            .read()
            .await
            .get(&(kind.to_string(), key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.to_string(),
                key: key.clone(),
            })
    }

    async fn list(&self, kind: &str, namespace: Option<&str>) -> StoreResult<Vec<RawObject>> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|((k, key), _)| k == kind && namespace.map_or(true, |ns| key.namespace == ns))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, mut object: RawObject) -> StoreResult<RawObject> {
        prepare_create(&mut object)?;
        let slot = (object.kind.clone(), object.key());

        let mut objects = self.objects.write().await;
        if objects.contains_key(&slot) {
            return Err(StoreError::AlreadyExists {
                kind: slot.0,
                key: slot.1,
            });
        }
        objects.insert(slot, object.clone());
        self.notify(WatchEventType::Added, &object);

        Ok(object)
    }

    async fn update(&self, object: RawObject) -> StoreResult<RawObject> {
        self.write(object, false).await
    }

    async fn update_status(&self, object: RawObject) -> StoreResult<RawObject> {
        self.write(object, true).await
    }

    async fn delete(&self, kind: &str, key: &ObjectKey) -> StoreResult<()> {
        let removed = self
            .objects
            .write()
            .await
            .remove(&(kind.to_string(), key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.to_string(),
                key: key.clone(),
            })?;

        self.notify(WatchEventType::Deleted, &removed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
