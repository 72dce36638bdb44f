use super::backend::{CaptureBackend, CaptureMethod, DisplayGeometry};
use crate::error::CaptureError;
use crate::frame::{PixelLayout, RawFrame};
use std::time::Duration;

/// Generates moving color bars, for headless runs and tests
pub struct TestPatternBackend {
    geometry: DisplayGeometry,
    initialized: bool,
    frame_counter: u64,
}

impl TestPatternBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            geometry: DisplayGeometry::new(width.max(1), height.max(1)),
            initialized: false,
            frame_counter: 0,
        }
    }
}

impl CaptureBackend for TestPatternBackend {
    fn method(&self) -> CaptureMethod {
        CaptureMethod::TestPattern
    }

    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError> {
        self.initialized = true;
        Ok(self.geometry)
    }

    fn capture_frame(&mut self, _timeout: Duration) -> Result<RawFrame, CaptureError> {
        if !self.initialized {
            return Err(CaptureError::frame_failed("test pattern not initialized"));
        }

        let DisplayGeometry { width, height } = self.geometry;
        let shift = (self.frame_counter % width as u64) as u32;
        self.frame_counter += 1;

        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let bar = (((x + shift) % width) * 8 / width) as u8;
                data.extend_from_slice(&[
                    bar.wrapping_mul(32),
                    (y * 255 / height) as u8,
                    255 - bar.wrapping_mul(32),
                    255,
                ]);
            }
        }

        Ok(RawFrame::packed(width, height, PixelLayout::Bgra8, data))
    }

    fn geometry(&self) -> Option<DisplayGeometry> {
        self.initialized.then_some(self.geometry)
    }
}
