use super::keymap::{resolve_key, KeyTarget, KeyboardLayout};
use super::surface::{detect_surface, InputSurface, MouseButton, SurfaceKind};
use crate::config::InputConfig;
use crate::error::{HeadcastError, InjectionError, Result};
use crate::profile::{InputSettings, Profile};
use crate::tracking::{InputAction, ProcessedInput};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Creates the OS surface when the dispatcher starts
pub type SurfaceFactory = Arc<dyn Fn() -> Option<Box<dyn InputSurface>> + Send + Sync>;

/// What happened to one injection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionOutcome {
    Injected,
    /// Below the minimum delta; the surface was not touched
    Skipped,
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectionStats {
    pub is_running: bool,
    pub surface: Option<SurfaceKind>,
    pub layout: String,
    pub actions_processed: u64,
    pub actions_skipped: u64,
    pub failures: u64,
    pub actions_per_sec: f64,
    pub uptime_secs: f64,
}

/// Scale a raw delta into whole pixels, or None when it should not move
///
/// Sensitivity is applied first, then the acceleration curve scales the
/// magnitude by `magnitude^(curve - 1)`.
pub fn scale_delta(dx: f64, dy: f64, settings: &InputSettings) -> Option<(i32, i32)> {
    let mut x = dx * settings.mouse_sensitivity;
    let mut y = dy * settings.mouse_sensitivity;

    if (settings.acceleration_curve - 1.0).abs() > f64::EPSILON {
        let magnitude = x.hypot(y);
        if magnitude > 0.0 {
            let factor = magnitude.powf(settings.acceleration_curve - 1.0);
            x *= factor;
            y *= factor;
        }
    }

    if x.abs() < settings.min_mouse_delta && y.abs() < settings.min_mouse_delta {
        return None;
    }

    let (x, y) = (x.round() as i32, y.round() as i32);
    if x == 0 && y == 0 {
        None
    } else {
        Some((x, y))
    }
}

/// Serializes mouse and keyboard commands onto one OS input surface
///
/// Every surface call goes through a single mutex, so concurrent callers
/// never interleave a press with another caller's release.
pub struct InjectionDispatcher {
    settings: Mutex<InputSettings>,
    layout: Mutex<KeyboardLayout>,
    key_hold: Duration,
    scroll_step: i32,
    factory: SurfaceFactory,
    surface: Mutex<Option<Box<dyn InputSurface>>>,
    actions_processed: AtomicU64,
    actions_skipped: AtomicU64,
    failures: AtomicU64,
    started: Mutex<Option<Instant>>,
}

impl InjectionDispatcher {
    pub fn new(config: &InputConfig, profile: &Profile) -> Result<Self> {
        let layout = config
            .keyboard_layout
            .parse::<KeyboardLayout>()
            .map_err(HeadcastError::Injection)?;
        let command_timeout = Duration::from_millis(config.command_timeout_ms);

        Ok(Self {
            settings: Mutex::new(profile.input.clone()),
            layout: Mutex::new(layout),
            key_hold: Duration::from_millis(config.key_hold_ms),
            scroll_step: config.scroll_step,
            factory: Arc::new(move || detect_surface(command_timeout)),
            surface: Mutex::new(None),
            actions_processed: AtomicU64::new(0),
            actions_skipped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            started: Mutex::new(None),
        })
    }

    /// Adopt the injection settings of a profile
    pub fn configure(&self, profile: &Profile) {
        *self.settings.lock() = profile.input.clone();
        debug!("Injection settings from profile '{}' applied", profile.name);
    }

    pub fn set_layout(&self, layout: KeyboardLayout) {
        *self.layout.lock() = layout;
        info!("Keyboard layout set to {}", layout);
    }

    pub fn layout(&self) -> KeyboardLayout {
        *self.layout.lock()
    }

    /// Units sent for a scroll action without an explicit amount
    pub fn scroll_step(&self) -> i32 {
        self.scroll_step
    }

    pub fn is_running(&self) -> bool {
        self.surface.lock().is_some()
    }

    /// Pick the OS surface; fails with `Unavailable` when there is none
    pub fn start(&self) -> std::result::Result<SurfaceKind, InjectionError> {
        let mut surface = self.surface.lock();
        if let Some(existing) = surface.as_ref() {
            return Ok(existing.kind());
        }

        let created = (self.factory)().ok_or(InjectionError::Unavailable)?;
        let kind = created.kind();
        *surface = Some(created);
        *self.started.lock() = Some(Instant::now());
        info!("Input injection started using {}", kind);
        Ok(kind)
    }

    pub fn stop(&self) {
        if self.surface.lock().take().is_some() {
            *self.started.lock() = None;
            info!("Input injection stopped");
        }
    }

    /// Apply a processed input: mouse delta first, then any action
    pub fn inject(
        &self,
        input: &ProcessedInput,
    ) -> std::result::Result<InjectionOutcome, InjectionError> {
        let result = self.apply(input);
        self.record(&result);
        result
    }

    fn apply(&self, input: &ProcessedInput) -> std::result::Result<InjectionOutcome, InjectionError> {
        self.ensure_running()?;

        let settings = self.settings.lock().clone();
        let mut outcome = InjectionOutcome::Skipped;

        if let Some((dx, dy)) = scale_delta(input.mouse_delta_x, input.mouse_delta_y, &settings) {
            self.with_surface(|surface| surface.move_relative(dx, dy))?;
            trace!("Mouse moved by ({}, {})", dx, dy);
            outcome = InjectionOutcome::Injected;
        }

        match &input.action {
            Some(InputAction::Press { key }) => {
                self.send_press_and_release(key, self.key_hold)?;
                outcome = InjectionOutcome::Injected;
            }
            Some(InputAction::Scroll { amount }) => {
                self.with_surface(|surface| surface.scroll(*amount))?;
                outcome = InjectionOutcome::Injected;
            }
            None => {}
        }

        Ok(outcome)
    }

    /// Press or release a key or mouse button by logical name
    pub fn inject_key(&self, key: &str, pressed: bool) -> std::result::Result<(), InjectionError> {
        let result = self.ensure_running().and_then(|_| {
            match resolve_key(key, self.layout())? {
                KeyTarget::Key(resolved) => self.with_surface(|surface| surface.key(resolved, pressed)),
                KeyTarget::Button(button) => {
                    self.with_surface(|surface| surface.button(button, pressed))
                }
            }
        });
        self.record(&result.clone().map(|_| InjectionOutcome::Injected));
        result
    }

    pub fn click(&self, button: MouseButton) -> std::result::Result<(), InjectionError> {
        let result = self.ensure_running().and_then(|_| {
            self.with_surface(|surface| {
                surface.button(button, true)?;
                surface.button(button, false)
            })
        });
        self.record(&result.clone().map(|_| InjectionOutcome::Injected));
        result
    }

    pub fn scroll(&self, amount: i32) -> std::result::Result<(), InjectionError> {
        let result = self
            .ensure_running()
            .and_then(|_| self.with_surface(|surface| surface.scroll(amount)));
        self.record(&result.clone().map(|_| InjectionOutcome::Injected));
        result
    }

    /// Press, hold, release; the surface lock is not held while holding
    pub fn press_and_release(
        &self,
        key: &str,
        hold: Duration,
    ) -> std::result::Result<(), InjectionError> {
        let result = self
            .ensure_running()
            .and_then(|_| self.send_press_and_release(key, hold));
        self.record(&result.clone().map(|_| InjectionOutcome::Injected));
        result
    }

    fn send_press_and_release(
        &self,
        key: &str,
        hold: Duration,
    ) -> std::result::Result<(), InjectionError> {
        let target = resolve_key(key, self.layout())?;
        let press = |pressed: bool| match target {
            KeyTarget::Key(resolved) => self.with_surface(|surface| surface.key(resolved, pressed)),
            KeyTarget::Button(button) => self.with_surface(|surface| surface.button(button, pressed)),
        };

        press(true)?;
        if !hold.is_zero() {
            thread::sleep(hold);
        }
        press(false)
    }

    fn ensure_running(&self) -> std::result::Result<(), InjectionError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(InjectionError::failed("dispatcher is not running"))
        }
    }

    fn with_surface<T>(
        &self,
        operation: impl FnOnce(&mut dyn InputSurface) -> std::result::Result<T, InjectionError>,
    ) -> std::result::Result<T, InjectionError> {
        let mut surface = self.surface.lock();
        match surface.as_mut() {
            Some(surface) => operation(surface.as_mut()),
            None => Err(InjectionError::failed("dispatcher is not running")),
        }
    }

    fn record(&self, result: &std::result::Result<InjectionOutcome, InjectionError>) {
        match result {
            Ok(InjectionOutcome::Injected) => {
                self.actions_processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(InjectionOutcome::Skipped) => {
                self.actions_skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Input injection failed: {}", e);
            }
        }
    }

    pub fn stats(&self) -> InjectionStats {
        let uptime_secs = self
            .started
            .lock()
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or_default();
        let actions_processed = self.actions_processed.load(Ordering::Relaxed);

        InjectionStats {
            is_running: self.is_running(),
            surface: self.surface.lock().as_ref().map(|surface| surface.kind()),
            layout: self.layout().to_string(),
            actions_processed,
            actions_skipped: self.actions_skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            actions_per_sec: if uptime_secs > 0.0 {
                actions_processed as f64 / uptime_secs
            } else {
                0.0
            },
            uptime_secs,
        }
    }
}

impl Drop for InjectionDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for an injection dispatcher
pub struct InjectionDispatcherBuilder {
    config: Option<InputConfig>,
    profile: Option<Profile>,
    surface: Option<SurfaceFactory>,
}

impl InjectionDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            profile: None,
            surface: None,
        }
    }

    pub fn config(mut self, config: InputConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Use a custom surface instead of detecting the platform one
    pub fn surface(mut self, factory: SurfaceFactory) -> Self {
        self.surface = Some(factory);
        self
    }

    pub fn build(self) -> Result<InjectionDispatcher> {
        let config = self
            .config
            .ok_or_else(|| HeadcastError::system("Input configuration must be specified"))?;
        let profile = self.profile.unwrap_or_default();

        let mut dispatcher = InjectionDispatcher::new(&config, &profile)?;
        if let Some(factory) = self.surface {
            dispatcher.factory = factory;
        }
        Ok(dispatcher)
    }
}

impl Default for InjectionDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
