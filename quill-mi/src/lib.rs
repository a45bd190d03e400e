//! Quill Media Ingest microservice
//!
//! Accepts media uploads, deduplicates them by content hash, stores the
//! bytes content-addressed on disk, and exposes live per-task progress
//! over polling and SSE endpoints.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod registry;
pub mod services;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::config::IngestConfig;
use crate::registry::{RegistryConfig, TaskRegistry};
use crate::services::{ContentHashIndex, IngestWorker, MediaStore, MetadataExtractor};

/// Shared application state
pub struct AppState {
    pub db: SqlitePool,
    pub registry: Arc<TaskRegistry>,
    pub store: MediaStore,
    pub worker: IngestWorker,
    pub config: IngestConfig,
    pub startup_time: Instant,
}

impl AppState {
    pub async fn new(config: IngestConfig, db: SqlitePool) -> quill_common::Result<Self> {
        let registry = Arc::new(TaskRegistry::new(RegistryConfig {
            retention: config.retention,
            sweep_interval: config.sweep_interval,
            event_capacity: config.event_capacity,
        }));
        let store = MediaStore::open(&config.root_folder).await?;
        let index = ContentHashIndex::new(db.clone());
        let worker = IngestWorker::new(
            Arc::clone(&registry),
            db.clone(),
            index,
            store.clone(),
            MetadataExtractor::new(),
            config.max_file_size,
            config.allowed_type_prefixes.clone(),
        );

        Ok(Self {
            db,
            registry,
            store,
            worker,
            config,
            startup_time: Instant::now(),
        })
    }
}

/// Build the service router
pub fn build_router(state: Arc<AppState>) -> Router {
    // Body limit covers the file plus multipart framing overhead
    let body_limit = state.config.max_file_size as usize + 64 * 1024;

    Router::new()
        .route("/health", get(api::health::health))
        .route("/upload", post(api::upload::upload))
        .route("/upload-progress/:task_id", get(api::progress::snapshot))
        .route("/upload-cancel/:task_id", post(api::progress::cancel))
        .route("/upload-stream/:task_id", get(api::stream::events))
        .route("/deduplication-stats", get(api::stats::dedup_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
