//! Upload task lifecycle record
//!
//! One `UploadTask` tracks a single submitted upload from `queued` to a
//! terminal state. Tasks are created by the upload endpoint, mutated only
//! by the ingestion worker processing them, read by the progress gateway,
//! and evicted from the registry after a retention window once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload task status
///
/// `Queued` and `Processing` are the only non-terminal states. The three
/// terminal states are absorbing: once entered, no field mutates again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, worker not yet started
    Queued,
    /// Worker is advancing through pipeline stages
    Processing,
    /// Pipeline finished, result populated
    Completed,
    /// Pipeline aborted with an error
    Failed,
    /// Cancellation honored at a checkpoint
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (absorbing)
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Wire label, matching the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Logical media record created for this upload
    pub media_id: Uuid,
    /// Physical file backing the record (differs from `media_id`'s own
    /// storage only when the upload deduplicated against earlier content)
    pub canonical_media_id: Uuid,
    /// True when the bytes matched an existing content hash
    pub is_duplicate: bool,
    /// Bytes not re-stored thanks to deduplication (0 for new content)
    pub space_saved: u64,
}

/// One submitted upload's lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTask {
    /// Unique task identifier, caller-facing
    pub id: Uuid,

    /// Owner; every access is authorized against this
    pub user_id: Uuid,

    /// Filename as declared by the upload
    pub filename: String,

    /// Size in bytes as declared by the upload
    pub file_size: u64,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Pipeline stage label; meaningful only while `Processing`
    pub stage: Option<String>,

    /// Progress 0-100, monotonically non-decreasing while `Processing`
    pub progress: u8,

    /// Task creation time
    pub started_at: DateTime<Utc>,

    /// Set only on a terminal transition
    pub ended_at: Option<DateTime<Utc>>,

    /// Populated only when `Failed`
    pub error: Option<String>,

    /// Populated only when `Completed`
    pub result: Option<UploadResult>,
}

impl UploadTask {
    /// Create a new task in `Queued` state
    pub fn new(user_id: Uuid, filename: String, file_size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            filename,
            file_size,
            status: TaskStatus::Queued,
            stage: None,
            progress: 0,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
            result: None,
        }
    }

    /// Estimated remaining time in milliseconds, linear extrapolation from
    /// elapsed time and progress. Absent unless `Processing` with progress
    /// above zero.
    pub fn estimated_remaining_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.status != TaskStatus::Processing || self.progress == 0 {
            return None;
        }
        let elapsed_ms = now
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        let total_ms = elapsed_ms * 100 / self.progress as u64;
        Some(total_ms.saturating_sub(elapsed_ms))
    }
}
