//! Execution API handlers.
//!
//! Handles creation, listing, lookup, re-run and deletion of workflow
//! executions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::{ObjectKey, WorkflowExecution, WorkflowState};
use crate::error::AppError;
use crate::services::execution::{CreateExecution, ExecutionFilter, ExecutionService};

/// Query parameters for listing executions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListExecutionsQuery {
    pub workflow: Option<String>,
    pub state: Option<WorkflowState>,
}

/// Start an execution.
///
/// POST /api/executions/{namespace}
pub async fn create(
    State(service): State<ExecutionService>,
    Path(namespace): Path<String>,
    Json(request): Json<CreateExecution>,
) -> Result<(StatusCode, Json<WorkflowExecution>), AppError> {
    let execution = service.create(&namespace, request).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

/// List executions.
///
/// GET /api/executions/{namespace}
pub async fn list(
    State(service): State<ExecutionService>,
    Path(namespace): Path<String>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<Vec<WorkflowExecution>>, AppError> {
    let filter = ExecutionFilter {
        workflow: query.workflow,
        state: query.state,
    };

    let executions = service.list(&namespace, &filter).await?;
    Ok(Json(executions))
}

/// Get an execution.
///
/// GET /api/executions/{namespace}/{name}
pub async fn get(
    State(service): State<ExecutionService>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let execution = service.get(&ObjectKey::new(namespace, name)).await?;
    Ok(Json(execution))
}

/// Re-run a finished execution.
///
/// POST /api/executions/{namespace}/{name}/rerun
pub async fn rerun(
    State(service): State<ExecutionService>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let execution = service.rerun(&ObjectKey::new(namespace, name)).await?;
    Ok(Json(execution))
}

/// Delete an execution.
///
/// DELETE /api/executions/{namespace}/{name}
pub async fn delete(
    State(service): State<ExecutionService>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service.delete(&ObjectKey::new(namespace, name)).await?;
    Ok(StatusCode::NO_CONTENT)
}
