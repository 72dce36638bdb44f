mod backend;
#[cfg(windows)]
mod dxgi;
mod engine;
mod normalize;
#[cfg(feature = "screen-grab")]
mod screen_grab;
#[cfg(target_os = "linux")]
mod screenshot_tool;
mod test_pattern;
#[cfg(test)]
mod tests;

pub use backend::{
    select_backend, BackendFactory, CaptureBackend, CaptureMethod, DisplayGeometry,
};
#[cfg(windows)]
pub use dxgi::DxgiBackend;
pub use engine::{CaptureEngine, CaptureEngineBuilder, CaptureStats};
pub use normalize::{normalize, resize_rgb};
#[cfg(feature = "screen-grab")]
pub use screen_grab::ScreenGrabBackend;
#[cfg(target_os = "linux")]
pub use screenshot_tool::ScreenshotToolBackend;
pub use test_pattern::TestPatternBackend;
