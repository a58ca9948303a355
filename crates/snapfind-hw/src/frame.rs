//! Frame type and pixel conversion: YUYV to RGB, dark detection, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::borrow::Cow;

/// Pixel layout of [`Frame::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Packed RGB, 3 bytes per pixel.
    Rgb8,
    /// 8-bit grayscale, 1 byte per pixel.
    Luma8,
}

impl Layout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Layout::Rgb8 => 3,
            Layout::Luma8 => 1,
        }
    }
}

/// A decoded camera frame.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    pub fn rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        Self::new(data, width, height, Layout::Rgb8, sequence)
    }

    pub fn luma(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        Self::new(data, width, height, Layout::Luma8, sequence)
    }

    fn new(data: Vec<u8>, width: u32, height: u32, layout: Layout, sequence: u32) -> Self {
        let mut frame = Self {
            data,
            width,
            height,
            layout,
            sequence,
            is_dark: false,
        };
        frame.is_dark = is_dark_frame(&frame.luma_plane(), 0.95);
        frame
    }

    /// Grayscale view of the frame.
    pub fn luma_plane(&self) -> Cow<'_, [u8]> {
        match self.layout {
            Layout::Luma8 => Cow::Borrowed(&self.data),
            Layout::Rgb8 => Cow::Owned(
                self.data
                    .chunks_exact(3)
                    .map(|px| {
                        let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                        y.round().clamp(0.0, 255.0) as u8
                    })
                    .collect(),
            ),
        }
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let luma = self.luma_plane();
        if luma.is_empty() {
            return 0.0;
        }
        luma.iter().map(|&b| b as f32).sum::<f32>() / luma.len() as f32
    }
}

/// Convert packed YUYV (4:2:2) to RGB using full-range BT.601.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            rgb.push(clamp_u8(y + 1.402 * v));
            rgb.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

/// Downscale 16-bit little-endian grayscale to 8-bit by keeping the high byte.
pub fn y16_to_grey(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

/// Check if a frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels are below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Encode a frame as baseline JPEG at `quality` (1–100).
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, FrameError> {
    let expected = (frame.width * frame.height) as usize * frame.layout.bytes_per_pixel();
    if frame.data.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: frame.data.len(),
        });
    }

    let color = match frame.layout {
        Layout::Rgb8 => ExtendedColorType::Rgb8,
        Layout::Luma8 => ExtendedColorType::L8,
    };
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(&frame.data[..expected], frame.width, frame.height, color)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(out)
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}
