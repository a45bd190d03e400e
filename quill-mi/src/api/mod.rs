//! HTTP API for the media ingest service

pub mod health;
pub mod progress;
pub mod stats;
pub mod stream;
pub mod upload;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::models::UploadTask;

/// Reject callers who do not own the task.
///
/// Ownership failures deliberately use a distinct code from missing tasks
/// so a caller probing someone else's task learns it exists but not more.
pub(crate) fn authorize(task: &UploadTask, caller: &Caller) -> Result<(), ApiError> {
    if task.user_id != caller.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}
