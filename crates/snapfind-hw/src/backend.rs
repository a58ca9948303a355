//! [`CameraBackend`] over V4L2 devices.
//!
//! Each session owns a dedicated OS thread that holds the device handle.
//! Grab requests travel over an mpsc channel with a oneshot reply; dropping the
//! sender ends the thread loop, which closes the device.

use async_trait::async_trait;
use snapfind_core::{CameraBackend, CameraError, EncodedImage, Facing, VideoStream};
use tokio::sync::{mpsc, oneshot};

use crate::camera::Camera;
use crate::frame;

/// Device paths per lens.
#[derive(Debug, Clone)]
pub struct V4lBackend {
    pub front: String,
    pub back: Option<String>,
    /// Frames discarded on the first grab of a session (AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl V4lBackend {
    pub fn new(front: impl Into<String>, back: Option<String>, warmup_frames: usize) -> Self {
        Self {
            front: front.into(),
            back,
            warmup_frames,
        }
    }

    fn device_for(&self, facing: Facing) -> Result<&str, CameraError> {
        match facing {
            Facing::Front => Ok(&self.front),
            Facing::Back => self
                .back
                .as_deref()
                .ok_or_else(|| CameraError::Unavailable("no back camera configured".into())),
        }
    }
}

struct GrabRequest {
    quality: u8,
    reply: oneshot::Sender<Result<EncodedImage, CameraError>>,
}

#[async_trait]
impl CameraBackend for V4lBackend {
    type Stream = V4lStream;

    async fn open(&mut self, facing: Facing) -> Result<V4lStream, CameraError> {
        let device = self.device_for(facing)?.to_string();
        let warmup = self.warmup_frames;
        let (opened_tx, opened_rx) = oneshot::channel::<Result<(), CameraError>>();
        let (tx, mut rx) = mpsc::channel::<GrabRequest>(1);

        std::thread::Builder::new()
            .name(format!("snapfind-camera-{facing}"))
            .spawn(move || {
                let camera = match Camera::open(&device) {
                    Ok(camera) => {
                        let _ = opened_tx.send(Ok(()));
                        camera
                    }
                    Err(e) => {
                        tracing::warn!(device = %device, error = %e, "camera open failed");
                        let _ = opened_tx.send(Err(e.into()));
                        return;
                    }
                };

                tracing::info!(device = %device, "camera worker started");
                let mut discard = warmup;
                while let Some(req) = rx.blocking_recv() {
                    let result = grab(&camera, std::mem::take(&mut discard), req.quality);
                    let _ = req.reply.send(result);
                }
                tracing::info!(device = %device, "camera worker exiting");
            })
            .map_err(|e| CameraError::Unavailable(format!("failed to spawn camera worker: {e}")))?;

        opened_rx
            .await
            .map_err(|_| CameraError::Unavailable("camera worker exited".into()))??;

        Ok(V4lStream { tx: Some(tx) })
    }
}

fn grab(camera: &Camera, discard: usize, quality: u8) -> Result<EncodedImage, CameraError> {
    let frame = camera.capture_frame(discard)?;
    if frame.is_dark {
        tracing::debug!(seq = frame.sequence, "dark frame; camera not ready");
        return Err(CameraError::NotReady);
    }
    let bytes = frame::encode_jpeg(&frame, quality)
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    Ok(EncodedImage::jpeg(bytes, frame.width, frame.height))
}

/// Handle to a session's camera worker.
pub struct V4lStream {
    tx: Option<mpsc::Sender<GrabRequest>>,
}

#[async_trait]
impl VideoStream for V4lStream {
    async fn grab(&mut self, jpeg_quality: u8) -> Result<EncodedImage, CameraError> {
        let tx = self.tx.as_ref().ok_or(CameraError::NotReady)?;
        let (reply, reply_rx) = oneshot::channel();
        tx.send(GrabRequest {
            quality: jpeg_quality,
            reply,
        })
        .await
        .map_err(|_| CameraError::Unavailable("camera worker exited".into()))?;
        reply_rx
            .await
            .map_err(|_| CameraError::Unavailable("camera worker exited".into()))?
    }

    fn release(&mut self) -> usize {
        usize::from(self.tx.take().is_some())
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_back_camera() {
        let mut backend = V4lBackend::new("/dev/video0", None, 0);
        let err = backend.open(Facing::Back).await.err().unwrap();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_open_failure_reported() {
        let mut backend = V4lBackend::new("/dev/snapfind-missing", None, 0);
        let err = backend.open(Facing::Front).await.err().unwrap();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (tx, _rx) = mpsc::channel(1);
        let mut stream = V4lStream { tx: Some(tx) };
        assert_eq!(stream.release(), 1);
        assert_eq!(stream.release(), 0);
        assert_eq!(stream.grab(95).await, Err(CameraError::NotReady));
    }
}
