//! Content-addressed media storage
//!
//! Uploads are spooled under `spool/<task_id>` while in flight, then
//! promoted to `media/<hh>/<hash>` once hashed, where `hh` is the first
//! two hex characters of the hash. Because the canonical path depends
//! only on content, concurrent uploads of identical bytes promote to the
//! same path and neither needs to clean up after losing a dedup race.

use quill_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Create the store, ensuring the spool and media directories exist
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("spool")).await?;
        tokio::fs::create_dir_all(root.join("media")).await?;
        Ok(Self { root })
    }

    /// In-flight path for an upload task
    pub fn spool_path(&self, task_id: Uuid) -> PathBuf {
        self.root.join("spool").join(task_id.to_string())
    }

    /// Canonical path for a content hash
    pub fn canonical_path(&self, hash: &str) -> PathBuf {
        let shard = &hash[..hash.len().min(2)];
        self.root.join("media").join(shard).join(hash)
    }

    /// Move a spooled file to its canonical location.
    ///
    /// If the canonical file already exists the spool copy is simply
    /// discarded; identical content is already stored.
    pub async fn promote(&self, task_id: Uuid, hash: &str) -> Result<PathBuf> {
        let spool = self.spool_path(task_id);
        let canonical = self.canonical_path(hash);

        if let Some(parent) = canonical.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if tokio::fs::try_exists(&canonical).await? {
            debug!(hash = %hash, "Canonical file already present, discarding spool copy");
            tokio::fs::remove_file(&spool).await?;
        } else {
            tokio::fs::rename(&spool, &canonical).await.map_err(|e| {
                Error::Storage(format!(
                    "failed to promote {} to {}: {e}",
                    spool.display(),
                    canonical.display()
                ))
            })?;
        }
        Ok(canonical)
    }

    /// Remove a spooled file, tolerating its absence
    pub async fn discard_spool(&self, task_id: Uuid) {
        let spool = self.spool_path(task_id);
        if let Err(e) = tokio::fs::remove_file(&spool).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %spool.display(), "Failed to discard spool file: {e}");
            }
        }
    }

    /// Remove a canonical file. Called only when the hash index reports
    /// zero remaining references.
    pub async fn remove_canonical(&self, hash: &str) -> Result<()> {
        let canonical = self.canonical_path(hash);
        match tokio::fs::remove_file(&canonical).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
