//! Media ingest service configuration
//!
//! Built-in defaults, overridden by `~/.config/quill/quill-mi.toml`, with
//! the root folder additionally overridable through the environment.

use quill_common::config::{read_service_toml, resolve_root_folder};
use quill_common::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const SERVICE_NAME: &str = "quill-mi";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// HTTP listen port
    pub port: u16,
    /// Root folder for the database, spool, and media store
    pub root_folder: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,
    /// MIME type prefixes accepted by validation
    pub allowed_type_prefixes: Vec<String>,
    /// Terminal task retention before registry eviction
    pub retention: Duration,
    /// Registry sweeper interval
    pub sweep_interval: Duration,
    /// Per-task event channel capacity
    pub event_capacity: usize,
    /// SSE heartbeat interval
    pub heartbeat: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            port: 5740,
            root_folder: quill_common::config::default_root_folder(),
            max_file_size: 100 * 1024 * 1024,
            allowed_type_prefixes: vec![
                "image/".to_string(),
                "video/".to_string(),
                "audio/".to_string(),
            ],
            retention: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            event_capacity: 64,
            heartbeat: Duration::from_secs(30),
        }
    }
}

impl IngestConfig {
    /// Load configuration: defaults, then the service TOML, then the
    /// root folder environment override.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(toml) = read_service_toml(SERVICE_NAME)? {
            config.apply_toml(&toml);
            info!("Loaded configuration overrides for {}", SERVICE_NAME);
        }

        config.root_folder = resolve_root_folder(SERVICE_NAME);
        Ok(config)
    }

    fn apply_toml(&mut self, toml: &toml::Value) {
        if let Some(port) = toml.get("port").and_then(|v| v.as_integer()) {
            self.port = port as u16;
        }
        if let Some(size) = toml.get("max_file_size").and_then(|v| v.as_integer()) {
            self.max_file_size = size as u64;
        }
        if let Some(prefixes) = toml.get("allowed_type_prefixes").and_then(|v| v.as_array()) {
            let parsed: Vec<String> = prefixes
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if !parsed.is_empty() {
                self.allowed_type_prefixes = parsed;
            }
        }
        if let Some(secs) = toml.get("retention_secs").and_then(|v| v.as_integer()) {
            self.retention = Duration::from_secs(secs.max(0) as u64);
        }
        if let Some(secs) = toml.get("sweep_interval_secs").and_then(|v| v.as_integer()) {
            self.sweep_interval = Duration::from_secs(secs.max(1) as u64);
        }
        if let Some(capacity) = toml.get("event_capacity").and_then(|v| v.as_integer()) {
            self.event_capacity = capacity.max(1) as usize;
        }
        if let Some(secs) = toml.get("heartbeat_secs").and_then(|v| v.as_integer()) {
            self.heartbeat = Duration::from_secs(secs.max(1) as u64);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("quill.db")
    }
}
