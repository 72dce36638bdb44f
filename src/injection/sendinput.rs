//! Win32 `SendInput` mouse and keyboard injection.

use super::keymap::Key;
use super::surface::{InputSurface, MouseButton, SurfaceKind};
use crate::error::InjectionError;
use windows::Win32::UI::Input::KeyboardAndMouse::*;

/// One wheel notch
const WHEEL_DELTA: i32 = 120;

/// Injects into the input stream of the current desktop session
pub struct SendInputSurface;

impl SendInputSurface {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendInputSurface {
    fn default() -> Self {
        Self::new()
    }
}

fn send_mouse(dx: i32, dy: i32, mouse_data: u32, flags: MOUSE_EVENT_FLAGS) -> Result<(), InjectionError> {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: mouse_data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };

    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 0 {
        return Err(InjectionError::failed("SendInput (mouse) returned 0"));
    }
    Ok(())
}

impl InputSurface for SendInputSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::SendInput
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        // Without MOUSEEVENTF_ABSOLUTE the offsets are relative
        send_mouse(dx, dy, 0, MOUSEEVENTF_MOVE)
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InjectionError> {
        let flags = match (button, pressed) {
            (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
            (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
            (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
            (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        };
        send_mouse(0, 0, 0, flags)
    }

    fn key(&mut self, key: Key, pressed: bool) -> Result<(), InjectionError> {
        let flags = if pressed {
            KEYBD_EVENT_FLAGS(0)
        } else {
            KEYEVENTF_KEYUP
        };

        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(key.vk),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };

        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent == 0 {
            return Err(InjectionError::failed(format!(
                "SendInput (key {}) returned 0",
                key.name
            )));
        }
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError> {
        let delta = amount.saturating_mul(WHEEL_DELTA);
        send_mouse(0, 0, delta as u32, MOUSEEVENTF_WHEEL)
    }
}
