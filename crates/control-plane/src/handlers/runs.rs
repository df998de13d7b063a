//! Run lookup.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::{ObjectKey, Run};
use crate::error::AppError;
use crate::services::ExecutionService;

/// GET /api/runs/{namespace}/{name}
pub async fn get(
    State(service): State<ExecutionService>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Run>, AppError> {
    let run = service.get_run(&ObjectKey::new(namespace, name)).await?;
    Ok(Json(run))
}
