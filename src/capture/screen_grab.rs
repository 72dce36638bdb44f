use super::backend::{CaptureBackend, CaptureMethod, DisplayGeometry};
use crate::error::CaptureError;
use crate::frame::{PixelLayout, RawFrame};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use xcap::Monitor;

/// Cross-platform capture through xcap
///
/// The grab itself cannot be interrupted, so the timeout is enforced after
/// the fact: a grab that overran its budget is discarded as stale.
pub struct ScreenGrabBackend {
    monitor_index: u32,
    monitor: Option<Monitor>,
    geometry: Option<DisplayGeometry>,
}

impl ScreenGrabBackend {
    pub fn new(monitor_index: u32) -> Self {
        Self {
            monitor_index,
            monitor: None,
            geometry: None,
        }
    }
}

impl CaptureBackend for ScreenGrabBackend {
    fn method(&self) -> CaptureMethod {
        CaptureMethod::ScreenGrab
    }

    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError> {
        let monitors = Monitor::all().map_err(|e| CaptureError::Unavailable {
            details: format!("monitor enumeration failed: {}", e),
        })?;
        let count = monitors.len();
        let monitor = monitors
            .into_iter()
            .nth(self.monitor_index as usize)
            .ok_or_else(|| CaptureError::Unavailable {
                details: format!(
                    "monitor {} not found ({} available)",
                    self.monitor_index, count
                ),
            })?;

        let geometry = DisplayGeometry::new(monitor.width(), monitor.height());
        info!(
            "Screen grab opened monitor {} ({})",
            self.monitor_index, geometry
        );
        self.monitor = Some(monitor);
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError> {
        let monitor = self
            .monitor
            .as_ref()
            .ok_or_else(|| CaptureError::frame_failed("screen grab not initialized"))?;

        let started = Instant::now();
        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::frame_failed(format!("screen grab failed: {}", e)))?;
        if started.elapsed() > timeout {
            debug!("Screen grab took {:?}, discarding", started.elapsed());
            return Err(CaptureError::Timeout(timeout));
        }

        let (width, height) = (image.width(), image.height());
        Ok(RawFrame::packed(width, height, PixelLayout::Rgba8, image.into_raw()))
    }

    fn geometry(&self) -> Option<DisplayGeometry> {
        self.geometry
    }
}
