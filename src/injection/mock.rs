use super::keymap::Key;
use super::surface::{InputSurface, MouseButton, SurfaceKind};
use crate::error::InjectionError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One primitive call received by a mock surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Move { dx: i32, dy: i32 },
    Button { button: MouseButton, pressed: bool },
    Key { name: &'static str, pressed: bool },
    Scroll { amount: i32 },
}

/// Records calls instead of touching the OS; used for dry runs and tests
///
/// Clones share the same call log, so a handle kept outside the dispatcher
/// sees everything the dispatcher sent.
#[derive(Clone, Default)]
pub struct MockInputSurface {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
    should_fail: Arc<AtomicBool>,
}

impl MockInputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Make every following call fail
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: SurfaceCall) -> Result<(), InjectionError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(InjectionError::failed("mock surface failure"));
        }
        debug!("Mock input: {:?}", call);
        self.calls.lock().push(call);
        Ok(())
    }
}

impl InputSurface for MockInputSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Mock
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        self.record(SurfaceCall::Move { dx, dy })
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InjectionError> {
        self.record(SurfaceCall::Button { button, pressed })
    }

    fn key(&mut self, key: Key, pressed: bool) -> Result<(), InjectionError> {
        self.record(SurfaceCall::Key {
            name: key.name,
            pressed,
        })
    }

    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError> {
        self.record(SurfaceCall::Scroll { amount })
    }
}
