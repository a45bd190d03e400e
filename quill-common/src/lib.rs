//! # Quill Common Library
//!
//! Shared code for the Quill content-management services including:
//! - Common error types
//! - Configuration and root folder resolution
//! - SQLite pool initialization
//! - Human-readable formatting helpers

pub mod config;
pub mod db;
pub mod error;
pub mod human;

pub use error::{Error, Result};
