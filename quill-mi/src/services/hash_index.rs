//! Content hash index
//!
//! Maps SHA-256 content hashes to canonical media records with reference
//! counts. The insert-or-link operation is a single upsert, so two uploads
//! of identical bytes racing each other resolve inside the database: one
//! becomes canonical, the other links to it. The index never double-counts
//! and never loses a reference.

use quill_common::{Error, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Compute the SHA-256 hash of a file's full contents
///
/// Runs on the blocking pool; reads in 1MB chunks so large uploads never
/// sit wholly in memory. Returns the lowercase hex digest.
pub async fn hash_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 1024 * 1024];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Hash(format!("hash task panicked: {e}")))?
}

/// Outcome of an insert-or-link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Record that owns the physical file
    pub canonical_media_id: Uuid,
    /// True when this call created the hash entry (caller's bytes are the
    /// canonical copy)
    pub is_new: bool,
    /// Reference count after this call
    pub reference_count: u64,
}

/// Reference-counted map from content hash to canonical media record
#[derive(Debug, Clone)]
pub struct ContentHashIndex {
    db: SqlitePool,
}

impl ContentHashIndex {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Look up a hash without mutating the index
    pub async fn lookup(&self, hash: &str) -> Result<Option<(Uuid, u64)>> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT canonical_media_id, reference_count FROM content_hash_index WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some((id, count)) => {
                let id = Uuid::parse_str(&id)
                    .map_err(|e| Error::Internal(format!("malformed canonical id: {e}")))?;
                Ok(Some((id, count as u64)))
            }
            None => Ok(None),
        }
    }

    /// Atomically insert a new hash entry or link to the existing one.
    ///
    /// A single upsert decides the race: the first caller for a hash
    /// becomes canonical with reference count 1, every later caller
    /// increments the count and receives the established canonical id.
    pub async fn insert_or_link(
        &self,
        hash: &str,
        candidate_media_id: Uuid,
        file_size: u64,
    ) -> Result<LinkOutcome> {
        let (canonical_id, reference_count): (String, i64) = sqlx::query_as(
            r#"
            INSERT INTO content_hash_index (hash, canonical_media_id, file_size, reference_count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(hash) DO UPDATE SET reference_count = reference_count + 1
            RETURNING canonical_media_id, reference_count
            "#,
        )
        .bind(hash)
        .bind(candidate_media_id.to_string())
        .bind(file_size as i64)
        .fetch_one(&self.db)
        .await?;

        let canonical_media_id = Uuid::parse_str(&canonical_id)
            .map_err(|e| Error::Internal(format!("malformed canonical id: {e}")))?;
        let is_new = reference_count == 1;

        debug!(
            hash = %hash,
            canonical = %canonical_media_id,
            reference_count,
            is_new,
            "Content hash linked"
        );

        Ok(LinkOutcome {
            canonical_media_id,
            is_new,
            reference_count: reference_count as u64,
        })
    }

    /// Release one reference on a hash.
    ///
    /// Used only as compensation when an upload aborts after linking;
    /// `releasing_media_id` is the aborted upload's media id. Returns true
    /// when the count reached zero and the entry was removed, meaning the
    /// physical file has no remaining owners. If references survive and
    /// the aborted upload held canonicity, canonicity is reassigned to a
    /// surviving media record so no canonical reference dangles.
    pub async fn release(&self, hash: &str, releasing_media_id: Uuid) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        // Decrement first: the transaction opens with the write lock, so
        // concurrent releases serialize instead of deadlocking on a
        // read-to-write upgrade.
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            UPDATE content_hash_index SET reference_count = reference_count - 1
            WHERE hash = ?
            RETURNING reference_count, canonical_media_id
            "#,
        )
        .bind(hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((count, canonical_id)) = row else {
            tx.rollback().await?;
            return Err(Error::NotFound(format!("content hash {hash}")));
        };

        if count <= 0 {
            sqlx::query("DELETE FROM content_hash_index WHERE hash = ?")
                .bind(hash)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(hash = %hash, "Content hash released, file removable");
            return Ok(true);
        }

        if canonical_id == releasing_media_id.to_string() {
            let survivor: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM media WHERE content_hash = ? ORDER BY created_at LIMIT 1",
            )
            .bind(hash)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((new_canonical,)) = survivor {
                sqlx::query("UPDATE content_hash_index SET canonical_media_id = ? WHERE hash = ?")
                    .bind(&new_canonical)
                    .bind(hash)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE media SET canonical_media_id = ? WHERE content_hash = ?")
                    .bind(&new_canonical)
                    .bind(hash)
                    .execute(&mut *tx)
                    .await?;
                info!(
                    hash = %hash,
                    new_canonical = %new_canonical,
                    "Reassigned canonical owner after abort"
                );
            }
        }

        tx.commit().await?;
        Ok(false)
    }
}
