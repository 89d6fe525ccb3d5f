mod file_source;

pub use file_source::FileImageSource;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use std::{io::Cursor, sync::Arc};

use crate::error::{GuideError, GuideResult};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Encoded still image shared between the session and in-flight requests.
pub type ImageData = Arc<Vec<u8>>;

/// Camera or any other producer of still images.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn capture(&self) -> Result<Vec<u8>>;
}

/// Pulls one still from the image source per request and normalises it for
/// upload. Never retries and never touches the session.
#[derive(Clone)]
pub struct CaptureCoordinator {
    source: Arc<dyn ImageSource>,
    max_dimension: u32,
}

impl CaptureCoordinator {
    pub fn new(source: Arc<dyn ImageSource>, max_dimension: u32) -> Self {
        Self {
            source,
            max_dimension,
        }
    }

    pub async fn request_capture(&self) -> GuideResult<ImageData> {
        let bytes = self.source.capture().await.map_err(|err| {
            log_warn!("image source failed: {err:#}");
            GuideError::CaptureFailed(format!("{err:#}"))
        })?;

        if bytes.is_empty() {
            return Err(GuideError::CaptureFailed(
                "image source returned no data".into(),
            ));
        }

        let max_dimension = self.max_dimension;
        let normalized = tokio::task::spawn_blocking(move || normalize(bytes, max_dimension))
            .await
            .map_err(|err| GuideError::CaptureFailed(format!("image worker join failed: {err}")))?
            .map_err(|err| GuideError::CaptureFailed(format!("{err:#}")))?;

        Ok(Arc::new(normalized))
    }
}

/// Rejects data that is not a decodable still; downsizes anything whose longer
/// edge exceeds `max_dimension` (0 disables resizing) and re-encodes it as JPEG.
fn normalize(bytes: Vec<u8>, max_dimension: u32) -> Result<Vec<u8>> {
    let format = image::guess_format(&bytes).context("unrecognised image format")?;
    let img = image::load_from_memory_with_format(&bytes, format)
        .with_context(|| format!("failed to decode {format:?} image"))?;

    let (width, height) = img.dimensions();
    if max_dimension == 0 || width.max(height) <= max_dimension {
        return Ok(bytes);
    }

    let resized = img.resize(max_dimension, max_dimension, FilterType::Triangle);
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(resized.to_rgb8())
        .write_to(&mut out, ImageFormat::Jpeg)
        .context("failed to re-encode resized image")?;

    log_debug!(
        "downscaled capture {}x{} -> {}x{} ({} -> {} bytes)",
        width,
        height,
        resized.width(),
        resized.height(),
        bytes.len(),
        out.get_ref().len()
    );

    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Mutex;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    struct QueueSource(Mutex<Vec<Result<Vec<u8>>>>);

    #[async_trait]
    impl ImageSource for QueueSource {
        async fn capture(&self) -> Result<Vec<u8>> {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn coordinator(results: Vec<Result<Vec<u8>>>, max_dimension: u32) -> CaptureCoordinator {
        CaptureCoordinator::new(Arc::new(QueueSource(Mutex::new(results))), max_dimension)
    }

    #[tokio::test]
    async fn small_images_pass_through_untouched() {
        let png = png_bytes(8, 6);
        let captured = coordinator(vec![Ok(png.clone())], 100)
            .request_capture()
            .await
            .unwrap();
        assert_eq!(captured.as_slice(), png.as_slice());
    }

    #[tokio::test]
    async fn oversized_images_are_downscaled_to_jpeg() {
        let captured = coordinator(vec![Ok(png_bytes(40, 20))], 10)
            .request_capture()
            .await
            .unwrap();

        assert_eq!(image::guess_format(&captured).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&captured).unwrap();
        assert_eq!(decoded.dimensions(), (10, 5));
    }

    #[tokio::test]
    async fn source_errors_and_garbage_are_capture_failures() {
        let coordinator = coordinator(
            vec![
                Err(anyhow::anyhow!("camera unplugged")),
                Ok(Vec::new()),
                Ok(b"definitely not an image".to_vec()),
            ],
            100,
        );

        for _ in 0..3 {
            assert!(matches!(
                coordinator.request_capture().await,
                Err(GuideError::CaptureFailed(_))
            ));
        }
    }
}
