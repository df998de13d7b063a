//! Object metadata shared by every kind.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Binds a spec type to its kind name and status type.
pub trait ResourceSpec:
    Serialize + DeserializeOwned + Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    type Status: Serialize
        + DeserializeOwned
        + Clone
        + Default
        + PartialEq
        + fmt::Debug
        + Send
        + Sync
        + 'static;

    /// Kind name used as the storage discriminator.
    const KIND: &'static str;
}

/// Namespace-scoped object identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from a child object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// Metadata maintained partly by callers and partly by the store.
///
/// The store owns `uid`, `resource_version`, `generation` and
/// `creation_timestamp`: `resource_version` is bumped on every write and
/// doubles as the compare-and-swap token, `generation` is bumped whenever
/// the spec changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub name: String,

    /// Prefix used by the store to generate `name` when it is empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    #[serde(default)]
    pub resource_version: i64,

    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Whether an owner reference points at the object with `uid`.
    pub fn is_owned_by(&self, uid: &str) -> bool {
        !uid.is_empty() && self.owner_references.iter().any(|o| o.uid == uid)
    }

    /// Name of the first owner of the given kind, if any.
    pub fn owner_name(&self, kind: &str) -> Option<&str> {
        self.owner_references
            .iter()
            .find(|o| o.kind == kind)
            .map(|o| o.name.as_str())
    }
}

/// A persisted object of kind `S::KIND`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Object<S: ResourceSpec> {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: S,

    #[serde(default)]
    pub status: S::Status,
}

impl<S: ResourceSpec> Object<S> {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: S) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: S::Status::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        S::KIND
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Owner reference that a child of this object should carry.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            kind: S::KIND.to_string(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
        }
    }
}

/// Observation recorded on an object's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Insert or update `type_` in `conditions`.
    ///
    /// The transition time only moves when status, reason or message
    /// change, so re-recording the same observation is not a modification.
    /// Returns whether the list changed.
    pub fn set(
        conditions: &mut Vec<Condition>,
        type_: &str,
        status: bool,
        reason: &str,
        message: &str,
    ) -> bool {
        if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status == status && existing.reason == reason && existing.message == message
            {
                return false;
            }
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.last_transition_time = Utc::now();
            return true;
        }

        conditions.push(Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: Utc::now(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("default", "we-1").to_string(), "default/we-1");
    }

    #[test]
    fn test_is_owned_by_ignores_empty_uid() {
        let mut meta = ObjectMeta::new("default", "child");
        meta.owner_references.push(OwnerReference {
            kind: "WorkflowExecution".to_string(),
            name: "parent".to_string(),
            uid: String::new(),
        });
        assert!(!meta.is_owned_by(""));
        assert_eq!(meta.owner_name("WorkflowExecution"), Some("parent"));
    }

    #[test]
    fn test_condition_set_is_stable() {
        let mut conditions = Vec::new();
        assert!(Condition::set(&mut conditions, "Reconciled", true, "", ""));
        let first = conditions[0].last_transition_time;

        assert!(!Condition::set(&mut conditions, "Reconciled", true, "", ""));
        assert_eq!(conditions[0].last_transition_time, first);

        assert!(Condition::set(&mut conditions, "Reconciled", false, "Error", "boom"));
        assert_eq!(conditions.len(), 1);
        assert!(!conditions[0].status);
    }
}
