//! Deduplication statistics (derived, never stored)

use quill_common::human::format_bytes;
use serde::{Deserialize, Serialize};

/// Aggregate view over the content hash index and media records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationStats {
    /// Distinct content hashes (physical files)
    pub total_unique_files: u64,
    /// Logical media records
    pub total_media_records: u64,
    /// Sum of reference counts across the index
    pub total_references: u64,
    /// Records that did not require a new physical file
    pub duplicates_saved: u64,
    /// Percentage of records deduplicated, in [0, 100]
    pub deduplication_rate: f64,
    /// Bytes not re-stored thanks to deduplication
    pub space_saved_bytes: u64,
    /// Saved bytes as a percentage of all logical bytes, in [0, 100]
    pub space_saved_percentage: f64,
    /// Human-readable one-liner for dashboards
    pub summary: String,
}

impl DeduplicationStats {
    /// Derive the statistics from raw aggregates
    pub fn compute(
        total_unique_files: u64,
        total_media_records: u64,
        total_references: u64,
        space_saved_bytes: u64,
        total_logical_bytes: u64,
    ) -> Self {
        let duplicates_saved = total_media_records.saturating_sub(total_unique_files);

        let deduplication_rate = if total_media_records == 0 {
            0.0
        } else {
            duplicates_saved as f64 / total_media_records as f64 * 100.0
        };

        let space_saved_percentage = if total_logical_bytes == 0 {
            0.0
        } else {
            space_saved_bytes as f64 / total_logical_bytes as f64 * 100.0
        };

        let summary = format!(
            "{} of {} uploads deduplicated, saving {} ({:.1}%)",
            duplicates_saved,
            total_media_records,
            format_bytes(space_saved_bytes),
            space_saved_percentage,
        );

        Self {
            total_unique_files,
            total_media_records,
            total_references,
            duplicates_saved,
            deduplication_rate,
            space_saved_bytes,
            space_saved_percentage,
            summary,
        }
    }
}
