//! Workflow template API handlers.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::{ObjectKey, Workflow, WorkflowSpec};
use crate::error::AppError;
use crate::services::WorkflowService;

/// Create or replace a workflow.
///
/// PUT /api/workflows/{namespace}/{name}
pub async fn put(
    State(service): State<WorkflowService>,
    Path((namespace, name)): Path<(String, String)>,
    Json(spec): Json<WorkflowSpec>,
) -> Result<Json<Workflow>, AppError> {
    let workflow = service.upsert(&ObjectKey::new(namespace, name), spec).await?;
    Ok(Json(workflow))
}

/// GET /api/workflows/{namespace}/{name}
pub async fn get(
    State(service): State<WorkflowService>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Workflow>, AppError> {
    let workflow = service.get(&ObjectKey::new(namespace, name)).await?;
    Ok(Json(workflow))
}
