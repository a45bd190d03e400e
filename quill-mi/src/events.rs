//! Per-task progress events
//!
//! Each upload task owns a typed `tokio::broadcast` channel carrying these
//! events. The registry publishes on every mutating transition; SSE clients
//! and tests subscribe. Dropping a receiver deterministically unregisters
//! it, so disconnected observers never accumulate.

use crate::models::{UploadResult, UploadTask};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events published on a task's channel
///
/// Per-task ordering is preserved: progress values are non-decreasing and
/// the terminal event is always last. A new subscriber receives a `Status`
/// snapshot immediately on subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskEvent {
    /// Full snapshot: sent to new subscribers and on status transitions
    /// that carry no richer payload (worker pickup, cancellation)
    Status { task: UploadTask },

    /// Progress checkpoint from the ingestion worker
    Progress {
        task_id: Uuid,
        progress: u8,
        stage: String,
    },

    /// Pipeline finished successfully
    Completed { task_id: Uuid, result: UploadResult },

    /// Pipeline aborted with an error
    Failed { task_id: Uuid, error: String },
}

impl TaskEvent {
    /// Event type as string, for SSE event names and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Status { .. } => "status",
            TaskEvent::Progress { .. } => "progress",
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::Failed { .. } => "failed",
        }
    }

    /// Whether a live stream should close after relaying this event
    pub fn is_terminal(&self) -> bool {
        match self {
            TaskEvent::Completed { .. } | TaskEvent::Failed { .. } => true,
            TaskEvent::Status { task } => task.status.is_terminal(),
            TaskEvent::Progress { .. } => false,
        }
    }
}
