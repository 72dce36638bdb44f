use crate::error::CaptureError;
use crate::frame::RawFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Native resolution of the captured display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
}

impl DisplayGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for DisplayGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which kind of backend produced the frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// Desktop duplication on Windows
    Dxgi,
    /// External screenshot tool (scrot, grim, import)
    ScreenshotTool,
    /// Cross-platform screen grabber
    ScreenGrab,
    /// Generated frames, no display needed
    TestPattern,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Dxgi => "dxgi",
            CaptureMethod::ScreenshotTool => "screenshot_tool",
            CaptureMethod::ScreenGrab => "screen_grab",
            CaptureMethod::TestPattern => "test_pattern",
        }
    }
}

impl fmt::Display for CaptureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dxgi" => Ok(CaptureMethod::Dxgi),
            "screenshot_tool" => Ok(CaptureMethod::ScreenshotTool),
            "screen_grab" => Ok(CaptureMethod::ScreenGrab),
            "test_pattern" => Ok(CaptureMethod::TestPattern),
            other => Err(format!("unknown capture method '{}'", other)),
        }
    }
}

/// A platform frame producer
///
/// Backends are created and used on the capture thread only, so they may
/// hold handles that cannot cross threads.
pub trait CaptureBackend {
    fn method(&self) -> CaptureMethod;

    /// Acquire whatever the backend needs and report the display geometry
    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError>;

    /// Grab one frame, giving up after `timeout`
    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError>;

    /// Geometry found by `initialize`, if it ran
    fn geometry(&self) -> Option<DisplayGeometry>;
}

/// Creates a fresh backend each time capture starts
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn CaptureBackend> + Send + Sync>;

/// Backends worth trying on this build, best first
fn platform_candidates(monitor: u32) -> Vec<Box<dyn CaptureBackend>> {
    let mut candidates: Vec<Box<dyn CaptureBackend>> = Vec::new();

    #[cfg(windows)]
    candidates.push(Box::new(super::dxgi::DxgiBackend::new(monitor)));

    #[cfg(target_os = "linux")]
    candidates.push(Box::new(super::screenshot_tool::ScreenshotToolBackend::new(
        monitor,
    )));

    #[cfg(feature = "screen-grab")]
    candidates.push(Box::new(super::screen_grab::ScreenGrabBackend::new(monitor)));

    let _ = monitor;
    candidates
}

fn backend_for(
    method: CaptureMethod,
    monitor: u32,
    width: u32,
    height: u32,
) -> Result<Box<dyn CaptureBackend>, CaptureError> {
    match method {
        CaptureMethod::TestPattern => Ok(Box::new(super::test_pattern::TestPatternBackend::new(
            width, height,
        ))),
        other => platform_candidates(monitor)
            .into_iter()
            .find(|backend| backend.method() == other)
            .ok_or_else(|| CaptureError::Unavailable {
                details: format!("{} capture is not supported by this build", other),
            }),
    }
}

/// Pick and initialize a backend
///
/// `preference` is `auto` or one method name. With `auto` every platform
/// candidate is tried in order and the first that initializes wins.
pub fn select_backend(
    preference: &str,
    monitor: u32,
    width: u32,
    height: u32,
) -> Result<(Box<dyn CaptureBackend>, DisplayGeometry), CaptureError> {
    if preference != "auto" {
        let method = preference
            .parse::<CaptureMethod>()
            .map_err(|details| CaptureError::Unavailable { details })?;
        let mut backend = backend_for(method, monitor, width, height)?;
        let geometry = backend.initialize()?;
        info!("Capture backend {} initialized at {}", method, geometry);
        return Ok((backend, geometry));
    }

    let mut failures = Vec::new();
    for mut backend in platform_candidates(monitor) {
        let method = backend.method();
        debug!("Trying capture backend {}", method);
        match backend.initialize() {
            Ok(geometry) => {
                info!("Capture backend {} initialized at {}", method, geometry);
                return Ok((backend, geometry));
            }
            Err(e) => {
                warn!("Capture backend {} unavailable: {}", method, e);
                failures.push(format!("{}: {}", method, e));
            }
        }
    }

    Err(CaptureError::Unavailable {
        details: if failures.is_empty() {
            "no capture backend compiled for this platform".to_string()
        } else {
            failures.join("; ")
        },
    })
}
