//! snapfind-hw: platform adapters for the capture workflow.
//!
//! V4L2 camera capture, a still-image camera for headless runs, and the local
//! photo album.

pub mod album;
pub mod backend;
pub mod camera;
pub mod frame;
pub mod still;

pub use album::AlbumStore;
pub use backend::{V4lBackend, V4lStream};
pub use camera::{Camera, DeviceInfo, PixelFormat, V4lError};
pub use frame::Frame;
pub use still::StillImageCamera;
