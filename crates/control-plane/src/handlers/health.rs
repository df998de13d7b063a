//! Health check endpoints for the flowrun Control Plane API.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Health status ("ok" or "unhealthy")
    pub status: String,
}

/// Detailed health check response for the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiHealthResponse {
    /// Overall health status
    pub status: String,

    /// Store connectivity status
    pub store: String,

    /// Keys waiting in the controller queue
    pub queue_depth: usize,

    /// Server uptime in seconds
    pub uptime_seconds: u64,

    /// Server version
    pub version: String,
}

/// Basic health check endpoint.
///
/// `GET /health`
///
/// Returns quickly without touching the store; suitable for load
/// balancer checks.
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "ok".to_string(),
    })
}

/// Detailed API health check endpoint.
///
/// `GET /api/health`
///
/// - `200 OK` when the store is reachable
/// - `503 Service Unavailable` otherwise
pub async fn api_health(State(state): State<AppState>) -> (StatusCode, Json<ApiHealthResponse>) {
    let store_healthy = state.client.store().ping().await;

    let (status, status_code) = if store_healthy {
        ("ok", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = ApiHealthResponse {
        status: status.to_string(),
        store: if store_healthy {
            "connected".to_string()
        } else {
            "disconnected".to_string()
        },
        queue_depth: state.queue.len().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AppConfig;
    use crate::controller::WorkQueue;
    use crate::store::{Client, MemoryStore};

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn test_api_health_with_memory_store() {
        let state = AppState::new(
            Client::new(Arc::new(MemoryStore::new())),
            Arc::new(WorkQueue::new()),
            AppConfig::default(),
        );
        let (code, Json(body)) = api_health(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.store, "connected");
        assert_eq!(body.queue_depth, 0);
    }
}
