//! Error types for the flowrun Control Plane.
//!
//! `AppError` is shared by the engine, the controller runtime and the HTTP
//! handlers; it implements `IntoResponse` for Axum.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api::ManifestError;
use crate::store::StoreError;

/// Application-level errors for the control plane.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A referenced object does not exist (yet).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// An object with the same identity already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency write collision.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed manifest or object content.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Storage backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Parse error (YAML manifests)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, AppError::AlreadyExists(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Store(msg) => {
                tracing::error!(error = %msg, "Store error");
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Parse(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Turn a not-found error into `Ok(None)`.
///
/// Missing dependencies are "not ready yet": the caller exits cleanly and
/// waits for the watch trigger that fires once the object appears.
pub fn ignore_not_found<T>(result: AppResult<T>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } => AppError::AlreadyExists(err.to_string()),
            StoreError::Conflict { .. } => AppError::Conflict(err.to_string()),
            StoreError::Invalid(msg) => AppError::BadRequest(msg),
            StoreError::Codec(e) => AppError::Serialization(e),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Backend(msg) => AppError::Store(msg),
        }
    }
}

impl From<ManifestError> for AppError {
    fn from(err: ManifestError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = AppError::NotFound("Workflow default/wf".to_string());
        assert_eq!(err.to_string(), "Resource not found: Workflow default/wf");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ignore_not_found() {
        let missing: AppResult<i32> = Err(AppError::NotFound("x".to_string()));
        assert!(matches!(ignore_not_found(missing), Ok(None)));

        let conflict: AppResult<i32> = Err(AppError::Conflict("x".to_string()));
        assert!(ignore_not_found(conflict).is_err());

        assert!(matches!(ignore_not_found(Ok(1)), Ok(Some(1))));
    }

    #[test]
    fn test_validation_from_manifest_error() {
        let err: AppError = ManifestError::ReservedStepId.into();
        assert_eq!(err.to_string(), "Validation error: step id \"output\" is reserved");
    }

    #[test]
    fn test_conflict_response_status() {
        let response = AppError::Conflict("stale".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
