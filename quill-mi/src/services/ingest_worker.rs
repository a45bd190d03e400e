//! Ingestion worker
//!
//! Drives one upload task through the pipeline: validate, hash, store and
//! link, derive metadata, finalize. Each stage reports a progress
//! checkpoint through the registry, and cancellation is honored
//! cooperatively at stage boundaries. On abort the worker compensates for
//! whatever it had already done: the spool file is discarded, an acquired
//! hash reference is released, and an orphaned canonical file is removed.

use crate::db;
use crate::registry::TaskRegistry;
use crate::services::{hash_file, ContentHashIndex, MediaStore, MetadataExtractor};
use crate::models::{UploadResult, UploadTask};
use quill_common::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Why the pipeline stopped early
enum Halt {
    Cancelled,
    Error(Error),
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Halt::Error(e)
    }
}

/// What the pipeline has acquired so far, for compensation on abort
#[derive(Default)]
struct Scratch {
    hash: Option<String>,
    media_id: Option<Uuid>,
    promoted: bool,
    linked: bool,
}

#[derive(Clone)]
pub struct IngestWorker {
    registry: Arc<TaskRegistry>,
    db: sqlx::SqlitePool,
    index: ContentHashIndex,
    store: MediaStore,
    extractor: MetadataExtractor,
    max_file_size: u64,
    allowed_type_prefixes: Vec<String>,
}

impl IngestWorker {
    pub fn new(
        registry: Arc<TaskRegistry>,
        db: sqlx::SqlitePool,
        index: ContentHashIndex,
        store: MediaStore,
        extractor: MetadataExtractor,
        max_file_size: u64,
        allowed_type_prefixes: Vec<String>,
    ) -> Self {
        Self {
            registry,
            db,
            index,
            store,
            extractor,
            max_file_size,
            allowed_type_prefixes,
        }
    }

    /// Run the pipeline for one task to a terminal state.
    ///
    /// Spawned per upload; never returns an error because every outcome,
    /// including internal failure, is recorded on the task itself.
    pub async fn run(&self, task_id: Uuid) {
        let Some(task) = self.registry.snapshot(task_id).await else {
            warn!(task_id = %task_id, "Task vanished before pickup");
            self.store.discard_spool(task_id).await;
            return;
        };

        // Cancelled while queued: nothing acquired beyond the spool file
        if task.status.is_terminal() {
            self.store.discard_spool(task_id).await;
            return;
        }

        let token = match self.registry.cancel_token(task_id).await {
            Some(token) => token,
            None => {
                self.store.discard_spool(task_id).await;
                return;
            }
        };

        if self.registry.begin(task_id).await.is_err() {
            self.store.discard_spool(task_id).await;
            return;
        }

        let mut scratch = Scratch::default();
        match self.process(&task, &token, &mut scratch).await {
            Ok(result) => {
                if let Err(e) = self.registry.complete(task_id, result).await {
                    warn!(task_id = %task_id, "Could not record completion: {e}");
                }
            }
            Err(Halt::Cancelled) => {
                info!(task_id = %task_id, "Pipeline cancelled at checkpoint");
                self.compensate(task_id, &scratch).await;
                if let Err(e) = self.registry.cancel(task_id).await {
                    warn!(task_id = %task_id, "Could not record cancellation: {e}");
                }
            }
            Err(Halt::Error(e)) => {
                error!(task_id = %task_id, "Pipeline failed: {e}");
                self.compensate(task_id, &scratch).await;
                if let Err(reg_err) = self.registry.fail(task_id, e.to_string()).await {
                    warn!(task_id = %task_id, "Could not record failure: {reg_err}");
                }
            }
        }
    }

    async fn process(
        &self,
        task: &UploadTask,
        token: &CancellationToken,
        scratch: &mut Scratch,
    ) -> Result<UploadResult, Halt> {
        let task_id = task.id;
        let spool = self.store.spool_path(task_id);

        if token.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        // Stage 1: validate
        self.progress(task_id, 5, "validating").await;
        let actual_size = tokio::fs::metadata(&spool)
            .await
            .map_err(|e| Error::Storage(format!("spooled upload missing: {e}")))?
            .len();
        if actual_size == 0 {
            return Err(Error::InvalidInput("uploaded file is empty".to_string()).into());
        }
        if actual_size > self.max_file_size {
            return Err(Error::InvalidInput(format!(
                "file size {actual_size} exceeds limit {}",
                self.max_file_size
            ))
            .into());
        }
        let mime_type = self.extractor.detect_mime(&spool).await?;
        let allowed = mime_type
            .as_deref()
            .is_some_and(|m| self.allowed_type_prefixes.iter().any(|p| m.starts_with(p)));
        if !allowed {
            return Err(Error::InvalidInput(format!(
                "unsupported file type: {}",
                mime_type.as_deref().unwrap_or("unrecognized")
            ))
            .into());
        }

        // Stage 2: hash
        self.progress(task_id, 15, "hashing").await;
        let hash = hash_file(&spool).await?;
        scratch.hash = Some(hash.clone());
        self.progress(task_id, 35, "hashing").await;

        if token.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        // Stage 3: store and link. The file is promoted to its
        // content-addressed path first, so a concurrent upload of the same
        // bytes lands on the identical path and the upsert decides who is
        // canonical.
        self.progress(task_id, 40, "storing").await;
        let media_id = Uuid::new_v4();
        scratch.media_id = Some(media_id);
        let canonical = self.store.promote(task_id, &hash).await?;
        scratch.promoted = true;
        let outcome = self.index.insert_or_link(&hash, media_id, actual_size).await?;
        scratch.linked = true;
        self.progress(task_id, 65, "storing").await;

        if token.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        // Stage 4: derive metadata, only when this upload stored new bytes
        let metadata = if outcome.is_new {
            self.progress(task_id, 70, "analyzing").await;
            let metadata = self.extractor.extract(&canonical, mime_type.as_deref()).await;
            self.progress(task_id, 85, "analyzing").await;
            metadata
        } else {
            crate::services::MediaMetadata {
                mime_type: mime_type.clone(),
                ..Default::default()
            }
        };

        // Stage 5: finalize
        self.progress(task_id, 95, "finalizing").await;
        db::insert_media_record(
            &self.db,
            media_id,
            task.user_id,
            &task.filename,
            &hash,
            outcome.canonical_media_id,
            actual_size,
            metadata.mime_type.as_deref(),
            metadata.dimensions,
            metadata.thumbnail_path.is_some(),
        )
        .await?;

        let is_duplicate = !outcome.is_new;
        info!(
            task_id = %task_id,
            media_id = %media_id,
            hash = %hash,
            is_duplicate,
            "Upload ingested"
        );

        Ok(UploadResult {
            media_id,
            canonical_media_id: outcome.canonical_media_id,
            is_duplicate,
            space_saved: if is_duplicate { actual_size } else { 0 },
        })
    }

    /// Undo whatever the aborted pipeline acquired
    async fn compensate(&self, task_id: Uuid, scratch: &Scratch) {
        self.store.discard_spool(task_id).await;

        let Some(hash) = &scratch.hash else {
            return;
        };

        if scratch.linked {
            let releasing = scratch.media_id.unwrap_or_default();
            match self.index.release(hash, releasing).await {
                Ok(true) => self.remove_file_and_thumbnail(hash).await,
                Ok(false) => {}
                Err(e) => warn!(hash = %hash, "Failed to release hash reference: {e}"),
            }
        } else if scratch.promoted {
            // Promoted but never linked: the file is an orphan only if no
            // earlier upload owns the hash
            match self.index.lookup(hash).await {
                Ok(None) => self.remove_file_and_thumbnail(hash).await,
                Ok(Some(_)) => {}
                Err(e) => warn!(hash = %hash, "Failed to check orphaned file: {e}"),
            }
        }
    }

    async fn remove_file_and_thumbnail(&self, hash: &str) {
        if let Err(e) = self.store.remove_canonical(hash).await {
            warn!(hash = %hash, "Failed to remove canonical file: {e}");
        }
        let thumb = self.store.canonical_path(hash).with_extension("thumb.jpg");
        let _ = tokio::fs::remove_file(&thumb).await;
    }

    async fn progress(&self, task_id: Uuid, progress: u8, stage: &str) {
        if let Err(e) = self.registry.update_progress(task_id, progress, stage).await {
            warn!(task_id = %task_id, stage, "Progress update rejected: {e}");
        }
    }
}
