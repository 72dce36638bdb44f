use crate::capture::resize_rgb;
use crate::error::StreamError;
use crate::frame::Frame;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use serde::Serialize;
use std::time::SystemTime;

pub const MIN_QUALITY: u8 = 10;
pub const MAX_QUALITY: u8 = 100;

/// Clamp a requested JPEG quality into the supported range
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(MIN_QUALITY as i64, MAX_QUALITY as i64) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Jpeg,
}

/// One encoded frame, shared by every session it is sent to
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Sequence number of the captured frame
    pub sequence: u64,
    /// Capture time of the source frame
    pub timestamp: SystemTime,
    pub width: u32,
    pub height: u32,
    pub format: PayloadFormat,
    pub data: Bytes,
}

/// Metadata sent alongside the payload
#[derive(Debug, Clone, Serialize)]
pub struct FrameHeader {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sequence: u64,
    pub timestamp: f64,
    pub format: PayloadFormat,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            kind: "video_frame",
            sequence: self.sequence,
            timestamp: self
                .timestamp
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64(),
            format: self.format,
            width: self.width,
            height: self.height,
            size: self.data.len(),
        }
    }
}

/// Resize `frame` to `width`x`height` if needed and encode it as JPEG
pub fn encode_jpeg(
    frame: &Frame,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<EncodedFrame, StreamError> {
    if !frame.validate_size() {
        return Err(StreamError::EncodeFailed {
            details: format!(
                "frame {} holds {} bytes, expected {}",
                frame.sequence,
                frame.data.len(),
                frame.expected_size()
            ),
        });
    }

    let resized;
    let pixels: &[u8] = if frame.width == width && frame.height == height {
        frame.data.as_slice()
    } else {
        resized = resize_rgb(frame.data.as_ref().clone(), frame.width, frame.height, width, height)
            .map_err(|e| StreamError::EncodeFailed {
                details: e.to_string(),
            })?;
        resized.as_slice()
    };

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, clamp_quality(quality as i64));
    encoder
        .encode(pixels, width, height, ColorType::Rgb8)
        .map_err(|e| StreamError::EncodeFailed {
            details: e.to_string(),
        })?;

    Ok(EncodedFrame {
        sequence: frame.sequence,
        timestamp: frame.timestamp,
        width,
        height,
        format: PayloadFormat::Jpeg,
        data: Bytes::from(buf),
    })
}
