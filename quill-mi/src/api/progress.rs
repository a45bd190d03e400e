//! Task snapshot and cancellation endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::authorize;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::models::{TaskStatus, UploadTask};
use crate::AppState;

/// Task snapshot plus a derived time estimate
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub task: UploadTask,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,
}

/// `GET /upload-progress/:task_id`
pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let task = state
        .registry
        .snapshot(task_id)
        .await
        .ok_or_else(|| ApiError::NotFound("task not found".to_string()))?;
    authorize(&task, &caller)?;

    let estimated_remaining_ms = task.estimated_remaining_ms(chrono::Utc::now());
    Ok(Json(ProgressResponse {
        task,
        estimated_remaining_ms,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// `POST /upload-cancel/:task_id`
///
/// Queued tasks cancel immediately; processing tasks stop at the worker's
/// next checkpoint. Repeating the request on a cancelled task succeeds.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let task = state
        .registry
        .snapshot(task_id)
        .await
        .ok_or_else(|| ApiError::NotFound("task not found".to_string()))?;
    authorize(&task, &caller)?;

    let status = state.registry.request_cancel(task_id).await?;
    Ok(Json(CancelResponse { task_id, status }))
}
