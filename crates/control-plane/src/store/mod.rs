//! Object storage and change notification.
//!
//! The engine only needs get/list/create/update with compare-and-swap on
//! `resource_version`, a distinguishable not-found error, and an
//! at-least-once change feed. [`Store`] is that contract; [`Client`] is the
//! typed facade the engine uses.
//!
//! - [`MemoryStore`]: single-process store, used for development and tests
//! - [`PgStore`]: PostgreSQL-backed store with `LISTEN/NOTIFY` change feed

pub mod client;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::{ObjectKey, ObjectMeta};

pub use client::Client;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Capacity of the change feed broadcast channel.
pub const WATCH_CAPACITY: usize = 1024;

/// Errors that can occur in a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    #[error("{kind} {key} was modified concurrently")]
    Conflict { kind: String, key: ObjectKey },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Untyped persisted object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: serde_json::Value,
    pub status: serde_json::Value,
}

impl RawObject {
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    /// Changes may have been lost; consumers re-list everything.
    Resync,
}

/// A change delivered on the feed.
///
/// `object` is the state after the change (before it, for deletions) when
/// the backend can provide it.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub kind: String,
    pub key: ObjectKey,
    pub object: Option<RawObject>,
}

impl WatchEvent {
    pub fn new(event_type: WatchEventType, object: RawObject) -> Self {
        Self {
            event_type,
            kind: object.kind.clone(),
            key: object.key(),
            object: Some(object),
        }
    }

    /// Marker sent after the feed recovered from an outage.
    pub fn resync() -> Self {
        Self {
            event_type: WatchEventType::Resync,
            kind: String::new(),
            key: ObjectKey::default(),
            object: None,
        }
    }

    pub fn is_resync(&self) -> bool {
        self.event_type == WatchEventType::Resync
    }
}

/// Storage substrate used by the control plane.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<RawObject>;

    /// List objects of `kind`, optionally restricted to a namespace.
    async fn list(&self, kind: &str, namespace: Option<&str>) -> StoreResult<Vec<RawObject>>;

    /// Create an object, generating its name from `generate_name` if empty.
    async fn create(&self, object: RawObject) -> StoreResult<RawObject>;

    /// Replace spec and caller-owned metadata; status is left untouched.
    async fn update(&self, object: RawObject) -> StoreResult<RawObject>;

    /// Replace status only.
    async fn update_status(&self, object: RawObject) -> StoreResult<RawObject>;

    async fn delete(&self, kind: &str, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribe to the change feed.
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;

    /// Whether the backend is reachable.
    async fn ping(&self) -> bool {
        true
    }
}

/// Fill in store-owned metadata for a new object.
pub(crate) fn prepare_create(object: &mut RawObject) -> StoreResult<()> {
    let meta = &mut object.metadata;

    if meta.namespace.is_empty() {
        return Err(StoreError::Invalid(format!(
            "{} has no namespace",
            object.kind
        )));
    }

    if meta.name.is_empty() {
        if meta.generate_name.is_empty() {
            return Err(StoreError::Invalid(format!(
                "{} has neither name nor generateName",
                object.kind
            )));
        }
        let suffix = Uuid::new_v4().simple().to_string();
        meta.name = format!("{}{}", meta.generate_name, &suffix[..8]);
    }

    meta.uid = Uuid::new_v4().to_string();
    meta.resource_version = 1;
    meta.generation = 1;
    meta.creation_timestamp = Some(Utc::now());

    if object.status.is_null() {
        object.status = serde_json::Value::Object(Default::default());
    }

    Ok(())
}

/// Compute the object resulting from a write of `incoming` over `current`.
///
/// Returns `Ok(None)` when the write changes nothing; such writes are not
/// persisted and produce no watch event. A stale `resource_version` is a
/// conflict.
pub(crate) fn apply_write(
    current: &RawObject,
    incoming: RawObject,
    status_only: bool,
) -> StoreResult<Option<RawObject>> {
    if incoming.metadata.resource_version != current.metadata.resource_version {
        return Err(StoreError::Conflict {
            kind: current.kind.clone(),
            key: current.key(),
        });
    }

    let mut next = current.clone();

    if status_only {
        if incoming.status == current.status {
            return Ok(None);
        }
        next.status = incoming.status;
    } else {
        let meta = &incoming.metadata;
        let unchanged = incoming.spec == current.spec
            && meta.labels == current.metadata.labels
            && meta.owner_references == current.metadata.owner_references
            && meta.finalizers == current.metadata.finalizers;
        if unchanged {
            return Ok(None);
        }
        if incoming.spec != current.spec {
            next.metadata.generation += 1;
        }
        next.spec = incoming.spec;
        next.metadata.labels = incoming.metadata.labels;
        next.metadata.owner_references = incoming.metadata.owner_references;
        next.metadata.finalizers = incoming.metadata.finalizers;
    }

    next.metadata.resource_version += 1;
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(name: &str) -> RawObject {
        RawObject {
            kind: "Run".to_string(),
            metadata: ObjectMeta::new("default", name),
            spec: json!({"threadName": "t1"}),
            status: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_prepare_create_generates_name() {
        let mut object = raw("");
        object.metadata.generate_name = "r1".to_string();
        prepare_create(&mut object).unwrap();

        assert!(object.metadata.name.starts_with("r1"));
        assert_eq!(object.metadata.name.len(), 10);
        assert_eq!(object.metadata.resource_version, 1);
        assert_eq!(object.metadata.generation, 1);
        assert!(object.status.is_object());
    }

    #[test]
    fn test_prepare_create_requires_name() {
        let mut object = raw("");
        assert!(matches!(
            prepare_create(&mut object),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_apply_write_bumps_generation_on_spec_change() {
        let mut current = raw("r");
        prepare_create(&mut current).unwrap();

        let mut incoming = current.clone();
        incoming.spec = json!({"threadName": "t2"});
        let next = apply_write(&current, incoming, false).unwrap().unwrap();
        assert_eq!(next.metadata.generation, 2);
        assert_eq!(next.metadata.resource_version, 2);

        let mut status_write = next.clone();
        status_write.status = json!({"state": "Running"});
        let after = apply_write(&next, status_write, true).unwrap().unwrap();
        assert_eq!(after.metadata.generation, 2);
        assert_eq!(after.metadata.resource_version, 3);
        assert_eq!(after.spec, json!({"threadName": "t2"}));
    }

    #[test]
    fn test_apply_write_noop_and_conflict() {
        let mut current = raw("r");
        prepare_create(&mut current).unwrap();

        assert!(apply_write(&current, current.clone(), false)
            .unwrap()
            .is_none());

        let mut stale = current.clone();
        stale.metadata.resource_version = 0;
        stale.spec = json!({});
        assert!(matches!(
            apply_write(&current, stale, false),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn test_spec_write_ignores_status() {
        let mut current = raw("r");
        prepare_create(&mut current).unwrap();

        let mut incoming = current.clone();
        incoming.status = json!({"state": "Complete"});
        assert!(apply_write(&current, incoming, false).unwrap().is_none());
    }
}
