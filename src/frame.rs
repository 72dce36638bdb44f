use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Pixel layout of a raw buffer coming out of a capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Blue, green, red, alpha (desktop duplication surfaces)
    Bgra8,
    /// Red, green, blue, alpha (generic screen grabbers, decoded PNG)
    Rgba8,
    /// Packed red, green, blue
    Rgb8,
}

impl PixelLayout {
    /// Get bytes per pixel for the layout
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Bgra8 | PixelLayout::Rgba8 => 4,
            PixelLayout::Rgb8 => 3,
        }
    }
}

/// Unnormalized pixels as produced by a backend
///
/// `stride` is the number of bytes per row and may exceed
/// `width * bytes_per_pixel` when the source pads rows.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Create a raw frame with tightly packed rows
    pub fn packed(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width as usize * layout.bytes_per_pixel(),
            layout,
            data,
        }
    }

    /// Minimum buffer length for the declared geometry
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + self.width as usize * self.layout.bytes_per_pixel()
    }
}

/// A normalized RGB24 frame published by the capture engine
///
/// Immutable once published; consumers share it through `Arc<Frame>`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Packed RGB24 pixels
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(sequence: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            sequence,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Expected buffer size for the frame geometry
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Check if frame is older than specified duration
    pub fn is_older_than(&self, duration: Duration) -> bool {
        SystemTime::now()
            .duration_since(self.timestamp)
            .map(|age| age > duration)
            .unwrap_or(false)
    }

    /// Capture time as fractional seconds since the unix epoch
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}
