//! Media metadata extraction
//!
//! Detects the MIME type from file content and, for images, decodes the
//! dimensions and renders a small thumbnail next to the canonical file.
//! Extraction is best effort: a file that detects as media but fails to
//! decode still ingests, just without derived data.

use image::ImageReader;
use quill_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const THUMBNAIL_MAX_DIM: u32 = 256;

/// Derived metadata for an ingested file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMetadata {
    pub mime_type: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub thumbnail_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Detect the MIME type from the file's leading bytes
    pub async fn detect_mime(&self, path: &Path) -> Result<Option<String>> {
        let kind = infer::get_from_path(path)
            .map_err(|e| Error::Storage(format!("failed to read {}: {e}", path.display())))?;
        Ok(kind.map(|k| k.mime_type().to_string()))
    }

    /// Extract dimensions and render a thumbnail for image content.
    ///
    /// Decoding happens on the blocking pool. Returns metadata with only
    /// the MIME type populated when the content is not a decodable image.
    pub async fn extract(&self, path: &Path, mime_type: Option<&str>) -> MediaMetadata {
        let mut metadata = MediaMetadata {
            mime_type: mime_type.map(str::to_string),
            ..Default::default()
        };

        let is_image = mime_type.is_some_and(|m| m.starts_with("image/"));
        if !is_image {
            return metadata;
        }

        let source = path.to_path_buf();
        let thumb = path.with_extension("thumb.jpg");
        let result = tokio::task::spawn_blocking(move || -> std::result::Result<_, image::ImageError> {
            let img = ImageReader::open(&source)?.with_guessed_format()?.decode()?;
            let dimensions = (img.width(), img.height());
            let thumbnail = img.thumbnail(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM);
            thumbnail.to_rgb8().save(&thumb)?;
            Ok((dimensions, thumb))
        })
        .await;

        match result {
            Ok(Ok((dimensions, thumbnail_path))) => {
                debug!(
                    width = dimensions.0,
                    height = dimensions.1,
                    "Extracted image metadata"
                );
                metadata.dimensions = Some(dimensions);
                metadata.thumbnail_path = Some(thumbnail_path);
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), "Image decode failed, ingesting without derived data: {e}");
            }
            Err(e) => {
                warn!("Metadata extraction task panicked: {e}");
            }
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Minimal valid 1x1 PNG
    fn tiny_png() -> Vec<u8> {
        let mut buf = Vec::new();
        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([255, 0, 0]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_detect_mime_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        tokio::fs::write(&path, tiny_png()).await.unwrap();

        let extractor = MetadataExtractor::new();
        let mime = extractor.detect_mime(&path).await.unwrap();
        assert_eq!(mime.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_detect_mime_unknown_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        tokio::fs::write(&path, b"not any known format").await.unwrap();

        let extractor = MetadataExtractor::new();
        assert_eq!(extractor.detect_mime(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_extract_image_dimensions_and_thumbnail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        tokio::fs::write(&path, tiny_png()).await.unwrap();

        let extractor = MetadataExtractor::new();
        let metadata = extractor.extract(&path, Some("image/png")).await;
        assert_eq!(metadata.dimensions, Some((1, 1)));
        let thumb = metadata.thumbnail_path.unwrap();
        assert!(tokio::fs::try_exists(&thumb).await.unwrap());
    }

    #[tokio::test]
    async fn test_extract_corrupt_image_is_best_effort() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        tokio::fs::write(&path, b"\x89PNG\r\n\x1a\ntruncated").await.unwrap();

        let extractor = MetadataExtractor::new();
        let metadata = extractor.extract(&path, Some("image/png")).await;
        assert_eq!(metadata.mime_type.as_deref(), Some("image/png"));
        assert_eq!(metadata.dimensions, None);
        assert_eq!(metadata.thumbnail_path, None);
    }

    #[tokio::test]
    async fn test_extract_skips_non_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        tokio::fs::write(&path, b"video bytes").await.unwrap();

        let extractor = MetadataExtractor::new();
        let metadata = extractor.extract(&path, Some("video/mp4")).await;
        assert_eq!(metadata.dimensions, None);
        assert_eq!(metadata.thumbnail_path, None);
    }
}
