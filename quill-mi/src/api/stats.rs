//! Deduplication statistics endpoint

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::auth::Caller;
use crate::db;
use crate::error::ApiError;
use crate::models::DeduplicationStats;
use crate::AppState;

/// `GET /deduplication-stats`
///
/// Derived from the hash index and media tables on every request; nothing
/// is cached or stored.
pub async fn dedup_stats(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> Result<Json<DeduplicationStats>, ApiError> {
    let agg = db::dedup_aggregates(&state.db).await?;
    Ok(Json(DeduplicationStats::compute(
        agg.total_unique_files,
        agg.total_media_records,
        agg.total_references,
        agg.space_saved_bytes,
        agg.total_logical_bytes,
    )))
}
