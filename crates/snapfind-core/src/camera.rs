//! Camera session lifecycle: start, stop, single-frame capture.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CameraError;
use crate::platform::{CameraBackend, VideoStream};
use crate::types::{EncodedImage, Facing};

/// Default JPEG quality for captured faces (0.95 on a 0–1 scale).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Public view of an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub facing: Facing,
    pub opened_at: DateTime<Utc>,
}

/// One camera-active period. The stream never leaves the manager.
struct CaptureSession<S> {
    info: SessionInfo,
    stream: S,
}

/// Owns the camera backend and at most one open session.
pub struct CameraSessionManager<C: CameraBackend> {
    backend: C,
    session: Option<CaptureSession<C::Stream>>,
    facing: Facing,
    secure_context: bool,
    jpeg_quality: u8,
}

impl<C: CameraBackend> CameraSessionManager<C> {
    /// `secure_context` is false when the client talks to an insecure origin;
    /// camera access is then refused before the device is touched.
    pub fn new(backend: C, secure_context: bool) -> Self {
        Self {
            backend,
            session: None,
            facing: Facing::default(),
            secure_context,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Open a session with the given lens, replacing any open one.
    pub async fn start(&mut self, facing: Facing) -> Result<SessionInfo, CameraError> {
        if !self.secure_context {
            tracing::warn!(%facing, "camera refused: insecure context");
            return Err(CameraError::InsecureContext);
        }

        self.stop();
        self.facing = facing;

        let stream = self.backend.open(facing).await.map_err(|e| {
            tracing::warn!(%facing, error = %e, "camera start failed");
            e
        })?;

        let info = SessionInfo {
            id: Uuid::new_v4(),
            facing,
            opened_at: Utc::now(),
        };
        tracing::info!(session = %info.id, %facing, "camera session started");
        self.session = Some(CaptureSession {
            info: info.clone(),
            stream,
        });
        Ok(info)
    }

    /// Release the open session, if any. Returns whether anything was released.
    pub fn stop(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        let tracks = session.stream.release();
        tracing::info!(session = %session.info.id, tracks, "camera session stopped");
        true
    }

    /// Encode the current frame of the open session. The session stays open.
    pub async fn capture_frame(&mut self) -> Result<EncodedImage, CameraError> {
        let quality = self.jpeg_quality;
        let Some(session) = self.session.as_mut() else {
            return Err(CameraError::NotReady);
        };
        let image = session.stream.grab(quality).await?;
        tracing::debug!(
            session = %session.info.id,
            bytes = image.bytes.len(),
            width = image.width,
            height = image.height,
            "frame captured"
        );
        Ok(image)
    }

    /// Lens for the next `start`. An open session keeps its current lens.
    pub fn set_facing(&mut self, facing: Facing) {
        self.facing = facing;
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref().map(|s| &s.info)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_secure_context(&self) -> bool {
        self.secure_context
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }
}

impl<C: CameraBackend> Drop for CameraSessionManager<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
