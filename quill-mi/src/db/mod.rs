//! Database layer for quill-mi
//!
//! Owns the media and content hash index tables. The pool is opened by
//! `quill_common::db::open_pool` (WAL, foreign keys, busy timeout) and the
//! tables are created idempotently at startup.

use quill_common::Result;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Open the service database and ensure its tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = quill_common::db::open_pool(db_path).await?;
    init_tables(&pool).await?;
    info!("Media ingest database ready at {}", db_path.display());
    Ok(pool)
}

/// Create the quill-mi tables if they do not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Logical media records. Many records may share one physical file;
    // canonical_media_id names the record that owns the stored bytes.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            canonical_media_id TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            mime_type TEXT,
            width INTEGER,
            height INTEGER,
            has_thumbnail INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_user ON media(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_hash ON media(content_hash)")
        .execute(pool)
        .await?;

    // One row per distinct content hash. reference_count tracks how many
    // logical records share the physical file.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_hash_index (
            hash TEXT PRIMARY KEY,
            canonical_media_id TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            reference_count INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One logical media record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaRecord {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub content_hash: String,
    pub canonical_media_id: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub has_thumbnail: bool,
}

/// Insert a logical media record
#[allow(clippy::too_many_arguments)]
pub async fn insert_media_record(
    pool: &SqlitePool,
    media_id: Uuid,
    user_id: Uuid,
    filename: &str,
    content_hash: &str,
    canonical_media_id: Uuid,
    file_size: u64,
    mime_type: Option<&str>,
    dimensions: Option<(u32, u32)>,
    has_thumbnail: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media
            (id, user_id, filename, content_hash, canonical_media_id,
             file_size, mime_type, width, height, has_thumbnail)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(media_id.to_string())
    .bind(user_id.to_string())
    .bind(filename)
    .bind(content_hash)
    .bind(canonical_media_id.to_string())
    .bind(file_size as i64)
    .bind(mime_type)
    .bind(dimensions.map(|(w, _)| w as i64))
    .bind(dimensions.map(|(_, h)| h as i64))
    .bind(has_thumbnail)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a media record by id
pub async fn get_media_record(pool: &SqlitePool, media_id: Uuid) -> Result<Option<MediaRecord>> {
    let record = sqlx::query_as::<_, MediaRecord>("SELECT * FROM media WHERE id = ?")
        .bind(media_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// Raw aggregates backing the deduplication statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupAggregates {
    pub total_unique_files: u64,
    pub total_media_records: u64,
    pub total_references: u64,
    pub space_saved_bytes: u64,
    pub total_logical_bytes: u64,
}

/// Aggregate the index and media tables in one pass each.
///
/// Saved space is the bytes of every reference beyond the first on each
/// hash; logical bytes count every reference.
pub async fn dedup_aggregates(pool: &SqlitePool) -> Result<DedupAggregates> {
    let index_row: (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(reference_count), 0),
            COALESCE(SUM((reference_count - 1) * file_size), 0),
            COALESCE(SUM(reference_count * file_size), 0)
        FROM content_hash_index
        "#,
    )
    .fetch_one(pool)
    .await?;

    let (media_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
        .fetch_one(pool)
        .await?;

    Ok(DedupAggregates {
        total_unique_files: index_row.0 as u64,
        total_references: index_row.1 as u64,
        space_saved_bytes: index_row.2 as u64,
        total_logical_bytes: index_row.3 as u64,
        total_media_records: media_count as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let (_dir, pool) = setup().await;
        init_tables(&pool).await.unwrap();
        init_tables(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_fetch_media_record() {
        let (_dir, pool) = setup().await;
        let media_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        insert_media_record(
            &pool,
            media_id,
            user_id,
            "photo.jpg",
            "abc123",
            media_id,
            2048,
            Some("image/jpeg"),
            Some((640, 480)),
            true,
        )
        .await
        .unwrap();

        let record = get_media_record(&pool, media_id).await.unwrap().unwrap();
        assert_eq!(record.user_id, user_id.to_string());
        assert_eq!(record.content_hash, "abc123");
        assert_eq!(record.file_size, 2048);
        assert_eq!(record.width, Some(640));
        assert!(record.has_thumbnail);

        assert!(get_media_record(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dedup_aggregates_empty() {
        let (_dir, pool) = setup().await;
        let agg = dedup_aggregates(&pool).await.unwrap();
        assert_eq!(agg.total_unique_files, 0);
        assert_eq!(agg.total_media_records, 0);
        assert_eq!(agg.space_saved_bytes, 0);
    }
}
