use super::keymap::Key;
use super::surface::{InputSurface, MouseButton, SurfaceKind};
use crate::error::InjectionError;
use crate::process::{find_in_path, run_with_deadline};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{info, trace};

/// Drives the X display through one `xdotool` invocation per call
///
/// Each invocation is killed when it outlives `timeout`, so a stalled X
/// server cannot hold the dispatcher.
pub struct XdotoolSurface {
    program: PathBuf,
    timeout: Duration,
}

impl XdotoolSurface {
    /// Find xdotool in PATH
    pub fn locate(timeout: Duration) -> Option<Self> {
        let program = find_in_path("xdotool")?;
        info!("Using xdotool at {}", program.display());
        Some(Self::with_program(program, timeout))
    }

    pub fn with_program(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    fn run(&self, args: &[String]) -> Result<(), InjectionError> {
        trace!("xdotool {}", args.join(" "));
        let status = run_with_deadline(Command::new(&self.program).args(args), self.timeout)
            .map_err(|e| InjectionError::failed(format!("xdotool {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(InjectionError::failed(format!(
                "xdotool {} exited with {}",
                args.first().map(String::as_str).unwrap_or_default(),
                status
            )))
        }
    }
}

fn button_number(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

impl InputSurface for XdotoolSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Xdotool
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        // "--" keeps negative offsets from being read as options
        self.run(&[
            "mousemove_relative".to_string(),
            "--".to_string(),
            dx.to_string(),
            dy.to_string(),
        ])
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InjectionError> {
        let command = if pressed { "mousedown" } else { "mouseup" };
        self.run(&[command.to_string(), button_number(button).to_string()])
    }

    fn key(&mut self, key: Key, pressed: bool) -> Result<(), InjectionError> {
        let command = if pressed { "keydown" } else { "keyup" };
        self.run(&[command.to_string(), key.keysym.to_string()])
    }

    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError> {
        if amount == 0 {
            return Ok(());
        }
        // Buttons 4 and 5 are wheel up and down
        let wheel = if amount > 0 { "4" } else { "5" };
        self.run(&[
            "click".to_string(),
            "--repeat".to_string(),
            amount.unsigned_abs().to_string(),
            wheel.to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;

    fn fake_tool(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("xdotool");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_hung_tool_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface =
            XdotoolSurface::with_program(fake_tool(&dir, "sleep 5"), Duration::from_millis(200));

        let started = Instant::now();
        let result = surface.move_relative(3, 4);

        assert!(matches!(result, Err(InjectionError::Failed { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_arguments_reach_tool() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let body = format!("printf '%s\\n' \"$*\" >> {}", log.display());
        let mut surface =
            XdotoolSurface::with_program(fake_tool(&dir, &body), Duration::from_secs(2));

        surface.move_relative(-5, 2).unwrap();
        surface.button(MouseButton::Right, true).unwrap();
        surface.scroll(-2).unwrap();
        surface.scroll(0).unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(
            lines,
            vec!["mousemove_relative -- -5 2", "mousedown 3", "click --repeat 2 5"]
        );
    }

    #[test]
    fn test_failing_tool_reports_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface =
            XdotoolSurface::with_program(fake_tool(&dir, "exit 1"), Duration::from_secs(2));
        assert!(surface.button(MouseButton::Left, false).is_err());
    }
}
