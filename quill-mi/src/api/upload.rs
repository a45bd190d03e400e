//! Upload submission endpoint
//!
//! `POST /upload` accepts a multipart body with a `file` part. The
//! bytes are spooled to disk as they arrive with the size limit enforced
//! mid-stream, a task is registered, and the ingestion pipeline is
//! spawned. The response returns immediately with the queued task.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::models::UploadTask;
use crate::AppState;

pub async fn upload(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadTask>), ApiError> {
    let max_size = state.config.max_file_size;

    // Spool under a placeholder name until the task exists
    let spool_tmp = state.store.spool_path(Uuid::new_v4());
    let mut filename = None;
    let mut spooled: Option<u64> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        filename = field.file_name().map(str::to_string);
        let mut file = tokio::fs::File::create(&spool_tmp)
            .await
            .map_err(|e| ApiError::Storage(format!("failed to open spool file: {e}")))?;

        let mut written: u64 = 0;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    remove_quietly(&spool_tmp).await;
                    return Err(ApiError::Validation(format!("upload interrupted: {e}")));
                }
            };
            written += chunk.len() as u64;
            if written > max_size {
                remove_quietly(&spool_tmp).await;
                return Err(ApiError::Validation(format!(
                    "file exceeds maximum size of {max_size} bytes"
                )));
            }
            if let Err(e) = file.write_all(&chunk).await {
                remove_quietly(&spool_tmp).await;
                return Err(ApiError::Storage(format!("failed to spool upload: {e}")));
            }
        }
        file.flush()
            .await
            .map_err(|e| ApiError::Storage(format!("failed to spool upload: {e}")))?;
        spooled = Some(written);
        break;
    }

    let Some(file_size) = spooled else {
        return Err(ApiError::Validation("missing 'file' part".to_string()));
    };
    let filename = filename.unwrap_or_else(|| "upload".to_string());

    let task = state
        .registry
        .create(caller.user_id, filename, file_size)
        .await;

    // Move the spool file to its task-addressed name
    let spool = state.store.spool_path(task.id);
    if let Err(e) = tokio::fs::rename(&spool_tmp, &spool).await {
        remove_quietly(&spool_tmp).await;
        let _ = state
            .registry
            .fail(task.id, "failed to stage upload".to_string())
            .await;
        return Err(ApiError::Storage(format!("failed to stage upload: {e}")));
    }

    debug!(task_id = %task.id, bytes = file_size, "Upload spooled");

    let worker = state.worker.clone();
    let task_id = task.id;
    tokio::spawn(async move {
        worker.run(task_id).await;
    });

    info!(task_id = %task.id, user_id = %caller.user_id, "Upload task queued");
    Ok((StatusCode::ACCEPTED, Json(task)))
}

async fn remove_quietly(path: &std::path::Path) {
    let _ = tokio::fs::remove_file(path).await;
}
