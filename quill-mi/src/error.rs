//! API error responses
//!
//! Every handler error maps to a stable machine-readable code and an HTTP
//! status, serialized as `{"error": {"code", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::registry::RegistryError;
use crate::models::TaskStatus;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Caller does not own the task
    #[error("access denied")]
    Forbidden,

    #[error("task already completed")]
    TaskCompleted,

    #[error("task already failed")]
    TaskFailed,

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Hash(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::TaskCompleted => "TASK_COMPLETED",
            ApiError::TaskFailed => "TASK_FAILED",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Hash(_) => "HASH_ERROR",
            ApiError::Internal(_) => "SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::TaskCompleted | ApiError::TaskFailed => StatusCode::CONFLICT,
            ApiError::Storage(_) | ApiError::Hash(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (self.status(), body).into_response()
    }
}

impl From<quill_common::Error> for ApiError {
    fn from(e: quill_common::Error) -> Self {
        match e {
            quill_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            quill_common::Error::InvalidInput(msg) => ApiError::Validation(msg),
            quill_common::Error::Storage(msg) => ApiError::Storage(msg),
            quill_common::Error::Hash(msg) => ApiError::Hash(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound => ApiError::NotFound("task not found".to_string()),
            RegistryError::AlreadyTerminal(TaskStatus::Completed) => ApiError::TaskCompleted,
            RegistryError::AlreadyTerminal(TaskStatus::Failed) => ApiError::TaskFailed,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::TaskCompleted.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::TaskFailed.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_registry_error_mapping() {
        assert_eq!(ApiError::from(RegistryError::NotFound).code(), "NOT_FOUND");
        assert_eq!(
            ApiError::from(RegistryError::AlreadyTerminal(TaskStatus::Completed)).code(),
            "TASK_COMPLETED"
        );
        assert_eq!(
            ApiError::from(RegistryError::AlreadyTerminal(TaskStatus::Failed)).code(),
            "TASK_FAILED"
        );
    }
}
