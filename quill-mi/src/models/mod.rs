//! Data models for quill-mi (Media Ingest microservice)

pub mod stats;
pub mod task;

pub use stats::DeduplicationStats;
pub use task::{TaskStatus, UploadResult, UploadTask};
