//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use snapfind_core::CameraError;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum V4lError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    /// The driver handed back a buffer shorter than the negotiated frame.
    #[error("incomplete frame: {0}")]
    Incomplete(String),
}

impl From<V4lError> for CameraError {
    fn from(err: V4lError) -> Self {
        match err {
            V4lError::PermissionDenied(detail) => CameraError::PermissionDenied(detail),
            V4lError::Incomplete(_) => CameraError::NotReady,
            V4lError::CaptureFailed(detail) => CameraError::CaptureFailed(detail),
            other => CameraError::Unavailable(other.to_string()),
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted to RGB.
    Yuyv,
    /// Motion JPEG; each buffer is a complete JPEG.
    Mjpg,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, V4lError> {
        if !Path::new(device_path).exists() {
            return Err(V4lError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                V4lError::PermissionDenied(format!("{device_path}: {e}"))
            }
            _ if e.raw_os_error() == Some(16) || e.to_string().contains("busy") => {
                V4lError::DeviceBusy
            }
            _ => V4lError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| V4lError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(V4lError::StreamingNotSupported);
        }

        // Ask for 720p YUYV; accept whatever supported format the driver settles on.
        let mut fmt = device
            .format()
            .map_err(|e| V4lError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 1280;
        fmt.height = 720;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| V4lError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpg
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(V4lError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Capture a single frame after discarding `discard` frames.
    pub fn capture_frame(&self, discard: usize) -> Result<Frame, V4lError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| V4lError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        for _ in 0..discard {
            stream
                .next()
                .map_err(|e| V4lError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|e| V4lError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        self.decode(buf, meta.sequence)
    }

    /// Convert a raw buffer to a frame based on the negotiated format.
    fn decode(&self, buf: &[u8], sequence: u32) -> Result<Frame, V4lError> {
        let (w, h) = (self.width, self.height);
        let incomplete = |e: frame::FrameError| V4lError::Incomplete(e.to_string());

        match self.pixel_format {
            PixelFormat::Yuyv => {
                let rgb = frame::yuyv_to_rgb(buf, w, h).map_err(incomplete)?;
                Ok(Frame::rgb(rgb, w, h, sequence))
            }
            PixelFormat::Y16 => {
                let grey = frame::y16_to_grey(buf, w, h).map_err(incomplete)?;
                Ok(Frame::luma(grey, w, h, sequence))
            }
            PixelFormat::Grey => {
                let pixels = (w * h) as usize;
                if buf.len() < pixels {
                    return Err(V4lError::Incomplete(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(Frame::luma(buf[..pixels].to_vec(), w, h, sequence))
            }
            PixelFormat::Mjpg => {
                let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map_err(|e| V4lError::Incomplete(format!("MJPG decode failed: {e}")))?
                    .to_rgb8();
                let (dw, dh) = decoded.dimensions();
                Ok(Frame::rgb(decoded.into_raw(), dw, dh, sequence))
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}
