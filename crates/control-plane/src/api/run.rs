//! Invocation records and external-call results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::meta::{Object, ResourceSpec};

/// A synchronous invocation produced by a step's underlying call.
pub type Run = Object<RunSpec>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Pending,
    Running,
    /// Suspended on `status.external_call`.
    Waiting,
    Complete,
    Error,
}

/// Call the run is suspended on, answered by a correlated result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCall {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_name: String,

    /// Step object this run executes for.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_step_name: String,

    /// Correlated results keyed by external call id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_call_results: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    #[serde(default)]
    pub state: RunState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_call: Option<ExternalCall>,
}

impl ResourceSpec for RunSpec {
    type Status = RunStatus;
    const KIND: &'static str = "Run";
}

impl RunSpec {
    /// Record the result for `id` unless one is already present.
    ///
    /// Returns whether the result was inserted.
    pub fn record_result(&mut self, id: &str, data: &str) -> bool {
        if self.external_call_results.contains_key(id) {
            return false;
        }
        self.external_call_results
            .insert(id.to_string(), data.to_string());
        true
    }

    pub fn result(&self, id: &str) -> Option<&str> {
        self.external_call_results.get(id).map(String::as_str)
    }
}

impl RunStatus {
    pub fn pending_call_id(&self) -> Option<&str> {
        self.external_call.as_ref().map(|c| c.id.as_str())
    }
}
