//! Application state for the flowrun Control Plane server.
//!
//! This module defines the shared application state that is
//! passed to all handlers via Axum's state management.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::controller::WorkQueue;
use crate::store::Client;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Typed client over the object store
    pub client: Client,

    /// Controller work queue, exposed for health reporting
    pub queue: Arc<WorkQueue>,

    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(client: Client, queue: Arc<WorkQueue>, config: AppConfig) -> Self {
        Self {
            client,
            queue,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
