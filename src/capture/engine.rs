use super::backend::{
    select_backend, BackendFactory, CaptureBackend, CaptureMethod, DisplayGeometry,
};
use super::normalize::normalize;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, HeadcastError, Result};
use crate::frame::Frame;
use crate::relay::FrameRelay;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);
/// Bound on backend selection and initialization
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters read by the capture loop at the start of every cycle
#[derive(Debug, Clone)]
struct CaptureSettings {
    width: u32,
    height: u32,
    fps: u32,
    monitor: u32,
    backend: String,
    operation_timeout: Duration,
}

impl CaptureSettings {
    fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            monitor: config.monitor,
            backend: config.backend.clone(),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        }
    }
}

/// Counters shared with the capture thread
#[derive(Debug)]
struct CaptureCounters {
    running: AtomicBool,
    /// Last frame sequence issued; survives restarts
    sequence: AtomicU64,
    frames_captured: AtomicU64,
    frames_failed: AtomicU64,
    method: Mutex<Option<CaptureMethod>>,
    native: Mutex<Option<DisplayGeometry>>,
    fps: Mutex<FpsWindow>,
}

#[derive(Debug)]
struct FpsWindow {
    started: Instant,
    frames: u64,
    fps: f64,
}

impl CaptureCounters {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            frames_captured: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            method: Mutex::new(None),
            native: Mutex::new(None),
            fps: Mutex::new(FpsWindow {
                started: Instant::now(),
                frames: 0,
                fps: 0.0,
            }),
        }
    }

    fn record_frame(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);

        let mut window = self.fps.lock();
        window.frames += 1;
        let elapsed = window.started.elapsed();
        if elapsed >= Duration::from_secs(1) {
            window.fps = window.frames as f64 / elapsed.as_secs_f64();
            window.frames = 0;
            window.started = Instant::now();
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_failure(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn reset_window(&self) {
        let mut window = self.fps.lock();
        window.started = Instant::now();
        window.frames = 0;
        window.fps = 0.0;
    }
}

/// Snapshot of capture statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureStats {
    pub is_capturing: bool,
    /// Measured rate, recomputed once per second
    pub fps: f64,
    pub frames_captured: u64,
    pub frames_failed: u64,
    pub method: Option<CaptureMethod>,
    pub native_geometry: Option<DisplayGeometry>,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub relay_occupancy: usize,
}

struct Worker {
    cancel: CancellationToken,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Paced screen capture publishing into a frame relay
///
/// The loop runs on its own OS thread named `headcast-capture`; the backend
/// is selected and initialized on that thread once per start.
pub struct CaptureEngine {
    settings: Arc<Mutex<CaptureSettings>>,
    relay: Arc<FrameRelay>,
    counters: Arc<CaptureCounters>,
    factory: Option<BackendFactory>,
    stop_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl CaptureEngine {
    pub fn new(config: &CaptureConfig, relay: Arc<FrameRelay>) -> Self {
        Self {
            settings: Arc::new(Mutex::new(CaptureSettings::from(config))),
            relay,
            counters: Arc::new(CaptureCounters::new()),
            factory: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            worker: Mutex::new(None),
        }
    }

    /// Change the normalized resolution, rate and monitor
    ///
    /// Resolution and rate take effect on the next cycle; the monitor on the
    /// next start.
    pub fn configure(
        &self,
        width: u32,
        height: u32,
        target_fps: u32,
        monitor_index: u32,
    ) -> std::result::Result<(), CaptureError> {
        if width == 0 || height == 0 || target_fps == 0 {
            return Err(CaptureError::InvalidGeometry {
                details: format!("{}x{} at {} fps", width, height, target_fps),
            });
        }

        let mut settings = self.settings.lock();
        settings.width = width;
        settings.height = height;
        settings.fps = target_fps;
        settings.monitor = monitor_index;
        info!(
            "Capture configured: {}x{} @ {}fps, monitor {}",
            width, height, target_fps, monitor_index
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.counters.running.load(Ordering::Relaxed)
    }

    /// Select a backend and start the capture loop
    ///
    /// Fails with `CaptureError::Unavailable` when no backend initializes.
    /// Starting a running engine is a no-op.
    pub fn start(&self) -> Result<CaptureMethod> {
        let mut worker = self.worker.lock();
        if let Some(method) = worker.as_ref().and(*self.counters.method.lock()) {
            warn!("Capture already running");
            return Ok(method);
        }

        let settings = Arc::clone(&self.settings);
        let relay = Arc::clone(&self.relay);
        let counters = Arc::clone(&self.counters);
        let factory = self.factory.clone();
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let (ready_tx, ready_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("headcast-capture".to_string())
            .spawn(move || {
                let initial = settings.lock().clone();
                let selected = match factory {
                    Some(factory) => {
                        let mut backend = factory();
                        backend.initialize().map(|geometry| (backend, geometry))
                    }
                    None => select_backend(
                        &initial.backend,
                        initial.monitor,
                        initial.width,
                        initial.height,
                    ),
                };

                match selected {
                    Ok((mut backend, geometry)) => {
                        *counters.method.lock() = Some(backend.method());
                        *counters.native.lock() = Some(geometry);
                        counters.running.store(true, Ordering::Relaxed);
                        counters.reset_window();
                        let _ = ready_tx.send(Ok(backend.method()));

                        run_capture_loop(
                            backend.as_mut(),
                            &settings,
                            &relay,
                            &counters,
                            &loop_cancel,
                        );
                        counters.running.store(false, Ordering::Relaxed);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| CaptureError::Unavailable {
                details: format!("failed to spawn capture thread: {}", e),
            })?;

        let method = match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(method)) => method,
            Ok(Err(e)) => {
                error!("Capture start failed: {}", e);
                let _ = handle.join();
                return Err(e.into());
            }
            Err(_) => {
                cancel.cancel();
                error!("Capture backend did not initialize within {:?}", STARTUP_TIMEOUT);
                return Err(CaptureError::Unavailable {
                    details: format!("backend initialization exceeded {:?}", STARTUP_TIMEOUT),
                }
                .into());
            }
        };

        *worker = Some(Worker {
            cancel,
            done: done_rx,
            handle,
        });
        info!("Capture started with {} backend", method);
        Ok(method)
    }

    /// Stop the loop, waiting up to the stop timeout
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.cancel.cancel();
        match worker.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Capture thread panicked");
                }
                info!("Capture stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture thread did not stop within {:?}; detaching",
                    self.stop_timeout
                );
            }
        }
        self.counters.running.store(false, Ordering::Relaxed);
        *self.counters.method.lock() = None;
    }

    /// Most recently published frame
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.relay.latest()
    }

    pub fn relay(&self) -> Arc<FrameRelay> {
        Arc::clone(&self.relay)
    }

    pub fn stats(&self) -> CaptureStats {
        let settings = self.settings.lock().clone();
        let is_capturing = self.is_running();
        CaptureStats {
            is_capturing,
            fps: if is_capturing {
                self.counters.fps.lock().fps
            } else {
                0.0
            },
            frames_captured: self.counters.frames_captured.load(Ordering::Relaxed),
            frames_failed: self.counters.frames_failed.load(Ordering::Relaxed),
            method: *self.counters.method.lock(),
            native_geometry: *self.counters.native.lock(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.fps,
            relay_occupancy: self.relay.occupancy(),
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_loop(
    backend: &mut dyn CaptureBackend,
    settings: &Mutex<CaptureSettings>,
    relay: &FrameRelay,
    counters: &CaptureCounters,
    cancel: &CancellationToken,
) {
    let mut published = 0u64;
    let mut next_capture = Instant::now();
    debug!("Capture loop running");

    while !cancel.is_cancelled() {
        let cycle = settings.lock().clone();
        let interval = cycle.interval();

        let now = Instant::now();
        if next_capture > now {
            thread::sleep(next_capture - now);
            if cancel.is_cancelled() {
                break;
            }
        } else if now.duration_since(next_capture) > interval {
            trace!("Capture loop behind schedule, resetting");
            next_capture = now;
        }
        next_capture += interval;

        let captured = backend
            .capture_frame(cycle.operation_timeout)
            .and_then(|raw| normalize(&raw, cycle.width, cycle.height));

        match captured {
            Ok(data) => {
                let sequence = counters.next_sequence();
                published += 1;
                let frame = Frame::new(sequence, SystemTime::now(), data, cycle.width, cycle.height);
                relay.publish(Arc::new(frame));
                counters.record_frame();
            }
            Err(e) => {
                counters.record_failure();
                debug!("Capture cycle failed: {}", e);
            }
        }
    }

    debug!("Capture loop exited after {} frames", published);
}

/// Builder for a capture engine
pub struct CaptureEngineBuilder {
    config: Option<CaptureConfig>,
    relay: Option<Arc<FrameRelay>>,
    factory: Option<BackendFactory>,
    stop_timeout: Option<Duration>,
}

impl CaptureEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            relay: None,
            factory: None,
            stop_timeout: None,
        }
    }

    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn relay(mut self, relay: Arc<FrameRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Use this backend instead of automatic selection
    pub fn backend(mut self, factory: BackendFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<CaptureEngine> {
        let config = self
            .config
            .ok_or_else(|| HeadcastError::system("Capture configuration must be specified"))?;
        let relay = self.relay.unwrap_or_default();

        let mut engine = CaptureEngine::new(&config, relay);
        engine.factory = self.factory;
        if let Some(timeout) = self.stop_timeout {
            engine.stop_timeout = timeout;
        }
        Ok(engine)
    }
}

impl Default for CaptureEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
