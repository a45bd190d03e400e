//! Configuration loading and root folder resolution
//!
//! Every Quill service keeps its working data under a single root folder.
//! Resolution priority:
//! 1. Environment variable (`QUILL_ROOT_FOLDER`)
//! 2. Per-service TOML config file (`root_folder` key)
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the root folder for all services
pub const ROOT_FOLDER_ENV: &str = "QUILL_ROOT_FOLDER";

/// Resolve the root folder for a service
pub fn resolve_root_folder(service: &str) -> PathBuf {
    // Priority 1: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 2: Per-service TOML config file
    if let Some(path) = config_file_path(service) {
        if let Ok(content) = std::fs::read_to_string(&path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&content) {
                if let Some(root) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root);
                }
            }
        }
    }

    // Priority 3: OS-dependent default
    default_root_folder()
}

/// Per-service config file location (`~/.config/quill/<service>.toml`)
pub fn config_file_path(service: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quill").join(format!("{}.toml", service)))
}

/// Read and parse the per-service TOML config file, if present
pub fn read_service_toml(service: &str) -> Result<Option<toml::Value>> {
    let Some(path) = config_file_path(service) else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(value))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("quill"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/quill"))
}

/// Create the directory (and parents) if missing
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| {
            Error::Config(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::info!("Created directory: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_folder_is_absolute() {
        assert!(default_root_folder().is_absolute());
    }

    #[test]
    fn test_ensure_directory_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());

        // Idempotent on existing directory
        ensure_directory(&nested).unwrap();
    }

    #[test]
    fn test_config_file_path_uses_service_name() {
        if let Some(path) = config_file_path("quill-mi") {
            assert!(path.ends_with("quill/quill-mi.toml"));
        }
    }
}
