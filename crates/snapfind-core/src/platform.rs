//! Capability seams each target environment implements: camera, HTTP, storage.

use async_trait::async_trait;

use crate::error::{ApiError, CameraError, StorageError};
use crate::types::{ApiBase, EncodedImage, EventId, EventInfo, Facing, PhotoDescriptor};

/// Opens camera streams for a given lens.
#[async_trait]
pub trait CameraBackend: Send {
    type Stream: VideoStream;

    /// Request camera access (video only) for `facing`.
    ///
    /// On failure the backend must not leave any device handle open.
    async fn open(&mut self, facing: Facing) -> Result<Self::Stream, CameraError>;
}

/// A live camera stream.
#[async_trait]
pub trait VideoStream: Send {
    /// Encode the current frame as a still image.
    ///
    /// Returns [`CameraError::NotReady`] until the stream has delivered a full frame.
    async fn grab(&mut self, jpeg_quality: u8) -> Result<EncodedImage, CameraError>;

    /// Release every underlying hardware track. Returns the number of tracks
    /// released; a second call releases nothing.
    fn release(&mut self) -> usize;
}

/// Source of photo bytes.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// API base that relative download URLs resolve against.
    fn base(&self) -> &ApiBase;

    /// Fetch raw bytes from an absolute URL.
    async fn fetch_photo(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// Guest-facing endpoints of the photo service.
#[async_trait]
pub trait GuestApi: PhotoSource {
    /// `GET /guest/events/{id}`. A 404 maps to [`ApiError::EventExpired`].
    async fn event_info(&self, event: &EventId) -> Result<EventInfo, ApiError>;

    /// `POST /guest/events/{id}/match-face`. An empty list is a valid result.
    async fn match_face(
        &self,
        event: &EventId,
        image: &EncodedImage,
    ) -> Result<Vec<PhotoDescriptor>, ApiError>;
}

/// Persistent local destination for downloaded photos.
#[async_trait]
pub trait PhotoStore: Send {
    /// Check (and where the platform asks for it, request) write access.
    async fn ensure_write_access(&mut self) -> Result<(), StorageError>;

    /// Persist one photo. Returns a human-readable location.
    async fn save(&mut self, photo: &PhotoDescriptor, bytes: &[u8]) -> Result<String, StorageError>;
}
