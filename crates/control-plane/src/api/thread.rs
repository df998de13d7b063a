//! Execution contexts.

use serde::{Deserialize, Serialize};

use super::meta::{Object, ResourceSpec};

/// Variable holding the normalized execution input.
pub const INPUT_ENV: &str = "WORKFLOW_INPUT";

/// Variable naming the shared workspace attached to an execution.
pub const WORKSPACE_ENV: &str = "WORKFLOW_WORKSPACE";

/// The environment a run's steps act within.
pub type Thread = Object<ThreadSpec>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_thread_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_execution_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub webhook_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email_receiver_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron_job_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadStatus {}

impl ResourceSpec for ThreadSpec {
    type Status = ThreadStatus;
    const KIND: &'static str = "Thread";
}

impl ThreadSpec {
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Set `name` to `value`, keeping names unique.
    ///
    /// The first occurrence is updated in place and later duplicates are
    /// dropped. Returns whether the environment changed.
    pub fn set_env(&mut self, name: &str, value: &str) -> bool {
        let mut changed = false;
        let mut seen = false;

        self.env.retain_mut(|e| {
            if e.name != name {
                return true;
            }
            if seen {
                changed = true;
                return false;
            }
            seen = true;
            if e.value != value {
                e.value = value.to_string();
                changed = true;
            }
            true
        });

        if !seen {
            self.env.push(EnvVar {
                name: name.to_string(),
                value: value.to_string(),
            });
            changed = true;
        }

        changed
    }
}
