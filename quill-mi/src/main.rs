//! quill-mi: Media Ingest microservice entry point

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quill_mi::config::IngestConfig;
use quill_mi::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting quill-mi v{}", env!("CARGO_PKG_VERSION"));

    let config = IngestConfig::load().context("Failed to load configuration")?;
    quill_common::config::ensure_directory(&config.root_folder)
        .context("Failed to create root folder")?;
    info!("Root folder: {}", config.root_folder.display());

    let db = quill_mi::db::init_database_pool(&config.database_path())
        .await
        .context("Failed to initialize database")?;

    let port = config.port;
    let state = Arc::new(
        AppState::new(config, db)
            .await
            .context("Failed to build application state")?,
    );
    state.registry.start();

    let app = build_router(Arc::clone(&state));

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("quill-mi listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    state.registry.stop();
    Ok(())
}
