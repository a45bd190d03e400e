//! Media ingest services

pub mod hash_index;
pub mod ingest_worker;
pub mod media_store;
pub mod metadata_extractor;

pub use hash_index::{hash_file, ContentHashIndex, LinkOutcome};
pub use ingest_worker::IngestWorker;
pub use media_store::MediaStore;
pub use metadata_extractor::{MediaMetadata, MetadataExtractor};
