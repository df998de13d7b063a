//! Application configuration for the flowrun Control Plane server.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Backend holding the object store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; state is lost on restart.
    #[default]
    Memory,
    Postgres,
}

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `FLOWRUN_`:
/// - `FLOWRUN_HOST`: Server bind address (default: "0.0.0.0")
/// - `FLOWRUN_PORT`: Server port (default: 8082)
/// - `FLOWRUN_STORE`: `memory` or `postgres` (default: memory)
/// - `FLOWRUN_WORKERS`: Number of reconcile workers (default: 4)
/// - `FLOWRUN_BOOTSTRAP_DIR`: Directory of workflow YAML files loaded at startup
/// - `FLOWRUN_LOG_JSON`: Emit JSON logs (default: false)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable debug mode
    #[serde(default)]
    pub debug: bool,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default)]
    pub store: StoreBackend,

    /// Number of concurrent reconcile workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Immediate retries of a pass that hit a write conflict
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// First requeue delay after a failed pass, in milliseconds
    #[serde(default = "default_requeue_base_ms")]
    pub requeue_base_ms: u64,

    /// Upper bound of the requeue delay, in milliseconds
    #[serde(default = "default_requeue_max_ms")]
    pub requeue_max_ms: u64,

    #[serde(default)]
    pub bootstrap_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_server_name() -> String {
    "flowrun-control-plane".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_requeue_base_ms() -> u64 {
    200
}

fn default_requeue_max_ms() -> u64 {
    30_000
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `FLOWRUN_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("FLOWRUN_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn requeue_base(&self) -> Duration {
        Duration::from_millis(self.requeue_base_ms)
    }

    pub fn requeue_max(&self) -> Duration {
        Duration::from_millis(self.requeue_max_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            server_name: default_server_name(),
            store: StoreBackend::default(),
            workers: default_workers(),
            max_conflict_retries: default_max_conflict_retries(),
            requeue_base_ms: default_requeue_base_ms(),
            requeue_max_ms: default_requeue_max_ms(),
            bootstrap_dir: None,
            log_json: false,
        }
    }
}
