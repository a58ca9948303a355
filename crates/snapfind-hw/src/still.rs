//! A camera backend that serves a still image from disk.
//!
//! Used for headless runs and for machines without a capture device. Both
//! lenses serve the same image.

use async_trait::async_trait;
use snapfind_core::{CameraBackend, CameraError, EncodedImage, Facing, VideoStream};
use std::io;
use std::path::PathBuf;

use crate::frame::{self, Frame};

pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraBackend for StillImageCamera {
    type Stream = StillStream;

    async fn open(&mut self, facing: Facing) -> Result<StillStream, CameraError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            let detail = format!("{}: {e}", self.path.display());
            match e.kind() {
                io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(detail),
                _ => CameraError::Unavailable(detail),
            }
        })?;
        let rgb = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::Unavailable(format!("{}: {e}", self.path.display())))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        tracing::info!(path = %self.path.display(), width, height, %facing, "still image loaded");

        Ok(StillStream {
            frame: Some(Frame::rgb(rgb.into_raw(), width, height, 0)),
        })
    }
}

pub struct StillStream {
    frame: Option<Frame>,
}

#[async_trait]
impl VideoStream for StillStream {
    async fn grab(&mut self, jpeg_quality: u8) -> Result<EncodedImage, CameraError> {
        let frame = self.frame.as_ref().ok_or(CameraError::NotReady)?;
        let bytes = frame::encode_jpeg(frame, jpeg_quality)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        Ok(EncodedImage::jpeg(bytes, frame.width, frame.height))
    }

    fn release(&mut self) -> usize {
        usize::from(self.frame.take().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("snapfind-still-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn test_still_image_grab_and_release() {
        let path = scratch("face.png");
        image::RgbImage::from_pixel(8, 6, image::Rgb([180, 150, 120]))
            .save(&path)
            .unwrap();

        let mut camera = StillImageCamera::new(&path);
        let mut stream = camera.open(Facing::Front).await.unwrap();
        let image = stream.grab(95).await.unwrap();
        assert_eq!(image.mime, "image/jpeg");
        assert_eq!((image.width, image.height), (8, 6));
        assert_eq!(&image.bytes[..2], &[0xFF, 0xD8]);

        assert_eq!(stream.release(), 1);
        assert_eq!(stream.release(), 0);
        assert_eq!(stream.grab(95).await, Err(CameraError::NotReady));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let mut camera = StillImageCamera::new(scratch("missing.jpg"));
        let err = camera.open(Facing::Back).await.err().unwrap();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_non_image_is_unavailable() {
        let path = scratch("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        let err = StillImageCamera::new(&path)
            .open(Facing::Front)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::Unavailable(_)));
        let _ = std::fs::remove_file(path);
    }
}
