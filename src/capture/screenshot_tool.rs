use super::backend::{CaptureBackend, CaptureMethod, DisplayGeometry};
use crate::error::CaptureError;
use crate::frame::{PixelLayout, RawFrame};
use crate::process::{find_in_path, output_with_deadline, run_with_deadline, ToolError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

const GEOMETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Screenshot programs, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScreenshotTool {
    Scrot,
    Grim,
    Import,
}

impl ScreenshotTool {
    const ALL: [ScreenshotTool; 3] = [
        ScreenshotTool::Scrot,
        ScreenshotTool::Grim,
        ScreenshotTool::Import,
    ];

    fn program(&self) -> &'static str {
        match self {
            ScreenshotTool::Scrot => "scrot",
            ScreenshotTool::Grim => "grim",
            ScreenshotTool::Import => "import",
        }
    }

    fn command(&self, output: &Path) -> Command {
        let mut command = Command::new(self.program());
        match self {
            ScreenshotTool::Scrot => {
                command.arg("--overwrite").arg(output);
            }
            ScreenshotTool::Grim => {
                command.arg(output);
            }
            ScreenshotTool::Import => {
                command.args(["-window", "root"]).arg(output);
            }
        }
        command
    }
}

/// Captures by shelling out to a screenshot tool and decoding its PNG
///
/// Each capture writes a scratch file in the temp directory. The whole
/// root window is captured; the monitor index is only logged.
pub struct ScreenshotToolBackend {
    monitor: u32,
    tool: Option<ScreenshotTool>,
    geometry: Option<DisplayGeometry>,
    scratch: PathBuf,
}

impl ScreenshotToolBackend {
    pub fn new(monitor: u32) -> Self {
        let scratch = env::temp_dir().join(format!(
            "headcast-capture-{}-{}.png",
            std::process::id(),
            monitor
        ));
        Self {
            monitor,
            tool: None,
            geometry: None,
            scratch,
        }
    }

    fn run_tool(&self, tool: ScreenshotTool, timeout: Duration) -> Result<(), CaptureError> {
        match run_with_deadline(&mut tool.command(&self.scratch), timeout) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(CaptureError::frame_failed(format!(
                "{} exited with {}",
                tool.program(),
                status
            ))),
            Err(ToolError::TimedOut(_)) => Err(CaptureError::Timeout(timeout)),
            Err(e) => Err(CaptureError::frame_failed(format!("{} {}", tool.program(), e))),
        }
    }

    fn read_scratch(&self) -> Result<RawFrame, CaptureError> {
        let image = image::open(&self.scratch)
            .map_err(|e| CaptureError::frame_failed(format!("screenshot decode failed: {}", e)))?
            .to_rgb8();
        let _ = fs::remove_file(&self.scratch);

        let (width, height) = image.dimensions();
        Ok(RawFrame::packed(width, height, PixelLayout::Rgb8, image.into_raw()))
    }
}

impl CaptureBackend for ScreenshotToolBackend {
    fn method(&self) -> CaptureMethod {
        CaptureMethod::ScreenshotTool
    }

    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError> {
        let tool = ScreenshotTool::ALL
            .iter()
            .copied()
            .find(|tool| find_in_path(tool.program()).is_some())
            .ok_or_else(|| CaptureError::Unavailable {
                details: "none of scrot, grim or import found in PATH".to_string(),
            })?;
        self.tool = Some(tool);

        let geometry = match query_xrandr_geometry() {
            Some(geometry) => geometry,
            None => {
                debug!("xrandr geometry unavailable, probing with a screenshot");
                let probe = self.capture_frame(GEOMETRY_TIMEOUT)?;
                DisplayGeometry::new(probe.width, probe.height)
            }
        };
        self.geometry = Some(geometry);

        info!(
            "Screenshot capture via {} (monitor {}, {})",
            tool.program(),
            self.monitor,
            geometry
        );
        Ok(geometry)
    }

    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError> {
        let tool = self
            .tool
            .ok_or_else(|| CaptureError::frame_failed("screenshot tool not initialized"))?;

        self.run_tool(tool, timeout)?;
        self.read_scratch()
    }

    fn geometry(&self) -> Option<DisplayGeometry> {
        self.geometry
    }
}

impl Drop for ScreenshotToolBackend {
    fn drop(&mut self) {
        if self.scratch.exists() {
            if let Err(e) = fs::remove_file(&self.scratch) {
                warn!("Failed to remove {}: {}", self.scratch.display(), e);
            }
        }
    }
}

fn query_xrandr_geometry() -> Option<DisplayGeometry> {
    let (status, stdout) =
        output_with_deadline(Command::new("xrandr").arg("--current"), GEOMETRY_TIMEOUT).ok()?;
    if !status.success() {
        return None;
    }
    parse_xrandr_current(&String::from_utf8_lossy(&stdout))
}

/// Size of the whole root window, from `current W x H` on the screen line
///
/// Screenshot tools grab the root window, which spans every output.
fn parse_xrandr_current(text: &str) -> Option<DisplayGeometry> {
    let line = text.lines().find(|line| line.starts_with("Screen "))?;
    let current = line
        .split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("current "))?;
    let (width, height) = current.split_once('x')?;

    let geometry = DisplayGeometry::new(width.trim().parse().ok()?, height.trim().parse().ok()?);
    (geometry.width > 0 && geometry.height > 0).then_some(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xrandr_root_size() {
        let text = "Screen 0: minimum 320 x 200, current 2560 x 1440, maximum 16384 x 16384
DP-1 connected primary 2560x1440+0+0 (normal left inverted right x axis y axis) 597mm x 336mm
   2560x1440     59.95*+ 143.97
   1920x1080     60.00    50.00
HDMI-1 disconnected (normal left inverted right x axis y axis)
";
        assert_eq!(
            parse_xrandr_current(text),
            Some(DisplayGeometry::new(2560, 1440))
        );
    }

    #[test]
    fn test_parse_xrandr_spans_all_outputs() {
        let text = "Screen 0: minimum 320 x 200, current 4480 x 1440, maximum 16384 x 16384
DP-1 connected primary 2560x1440+0+0 (normal left inverted right x axis y axis) 597mm x 336mm
   2560x1440     59.95*+ 143.97
HDMI-1 connected 1920x1080+2560+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00*+  50.00
";
        assert_eq!(
            parse_xrandr_current(text),
            Some(DisplayGeometry::new(4480, 1440))
        );
    }

    #[test]
    fn test_parse_xrandr_without_screen_line() {
        assert_eq!(parse_xrandr_current("   1920x1080     60.00*+\n"), None);
        assert_eq!(parse_xrandr_current("Screen 0: minimum 8 x 8\n"), None);
        assert_eq!(parse_xrandr_current(""), None);
    }

    #[test]
    fn test_tool_commands() {
        let path = Path::new("/tmp/shot.png");
        let command = ScreenshotTool::Import.command(path);
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(command.get_program(), "import");
        assert_eq!(args, ["-window", "root", "/tmp/shot.png"]);
    }
}
