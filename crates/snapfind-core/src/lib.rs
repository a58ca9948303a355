//! snapfind-core: guest face-capture workflow.
//!
//! Drives one guest session against the photo service: open the camera, grab a
//! single frame, submit it for matching, review and select results, and save
//! photos locally. Hardware, HTTP and storage sit behind the traits in
//! [`platform`], so the same controller runs against V4L2, a still image, or
//! test fakes.

pub mod camera;
pub mod download;
pub mod error;
pub mod platform;
pub mod selection;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use camera::{CameraSessionManager, SessionInfo, DEFAULT_JPEG_QUALITY};
pub use download::{DownloadOrchestrator, DownloadOutcome, DownloadSummary};
pub use error::{ApiError, CameraError, Resource, StorageError, WorkflowError};
pub use platform::{CameraBackend, GuestApi, PhotoSource, PhotoStore, VideoStream};
pub use selection::{SelectionChange, SelectionSet};
pub use types::{
    lookup_labels, parse_photo_list, ApiBase, EncodedImage, EventId, EventInfo, Facing, LabelLookup,
    ParseError, PhotoDescriptor, PhotoId,
};
pub use workflow::{
    Affordances, BatchScope, Controller, EventStatus, MatchTicket, Notice, Severity,
    WorkflowConfig, WorkflowState,
};
