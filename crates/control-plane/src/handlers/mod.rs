//! HTTP handlers for the flowrun Control Plane API.
//!
//! This module contains all route handlers organized by domain, and the
//! router that wires them together with the HTTP middleware stack.

pub mod executions;
pub mod health;
pub mod runs;
pub mod workflows;

pub use health::{api_health, health_check};

use std::any::Any;
use std::backtrace::Backtrace;

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::services::{ExecutionService, WorkflowService};
use crate::state::AppState;

/// Build the application router with all routes.
pub fn router(state: AppState) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    let workflow_service = WorkflowService::new(state.client.clone());
    let execution_service = ExecutionService::new(state.client.clone());

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(api_health))
        .with_state(state);

    let workflow_routes = Router::new()
        .route(
            "/api/workflows/{namespace}/{name}",
            put(workflows::put).get(workflows::get),
        )
        .with_state(workflow_service);

    let execution_routes = Router::new()
        .route(
            "/api/executions/{namespace}",
            post(executions::create).get(executions::list),
        )
        .route(
            "/api/executions/{namespace}/{name}",
            get(executions::get).delete(executions::delete),
        )
        .route(
            "/api/executions/{namespace}/{name}/rerun",
            post(executions::rerun),
        )
        .route("/api/runs/{namespace}/{name}", get(runs::get))
        .with_state(execution_service);

    Router::new()
        .merge(health_routes)
        .merge(workflow_routes)
        .merge(execution_routes)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
}

fn make_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

fn panic_detail(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Log the panic with a stack trace and answer with an opaque 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic_detail(&*err);
    let backtrace = Backtrace::force_capture();
    tracing::error!(panic = %detail, backtrace = %backtrace, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "encountered an unexpected error" })),
    )
        .into_response()
}
