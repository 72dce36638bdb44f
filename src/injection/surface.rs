use super::keymap::Key;
use crate::error::InjectionError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Which OS mechanism a surface drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    SendInput,
    Xdotool,
    Mock,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::SendInput => "send_input",
            SurfaceKind::Xdotool => "xdotool",
            SurfaceKind::Mock => "mock",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive input operations on the OS input stream
///
/// Implementations hold no persistent OS handles; each call stands alone.
pub trait InputSurface: Send {
    fn kind(&self) -> SurfaceKind;

    /// Move the cursor by a relative offset in pixels
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InjectionError>;

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InjectionError>;

    fn key(&mut self, key: Key, pressed: bool) -> Result<(), InjectionError>;

    /// Scroll by wheel units, positive is up
    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError>;
}

/// Pick the native surface for this platform, falling back to xdotool
///
/// `command_timeout` bounds each call of a surface that drives an external
/// program.
pub fn detect_surface(command_timeout: Duration) -> Option<Box<dyn InputSurface>> {
    #[cfg(windows)]
    let surface: Option<Box<dyn InputSurface>> = {
        let _ = command_timeout;
        Some(Box::new(super::sendinput::SendInputSurface::new()))
    };

    #[cfg(target_os = "linux")]
    let surface: Option<Box<dyn InputSurface>> = super::xdotool::XdotoolSurface::locate(command_timeout)
        .map(|surface| Box::new(surface) as Box<dyn InputSurface>);

    #[cfg(not(any(windows, target_os = "linux")))]
    let surface: Option<Box<dyn InputSurface>> = {
        let _ = command_timeout;
        None
    };

    surface
}
