use super::*;
use crate::config::HeadcastConfig;
use crate::error::{CaptureError, HeadcastError};
use crate::frame::{PixelLayout, RawFrame};
use crate::relay::FrameRelay;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn test_config(width: u32, height: u32, fps: u32) -> crate::config::CaptureConfig {
    let mut config = HeadcastConfig::default().capture;
    config.width = width;
    config.height = height;
    config.fps = fps;
    config.backend = "test_pattern".to_string();
    config
}

fn pattern_factory(width: u32, height: u32) -> BackendFactory {
    Arc::new(move || Box::new(TestPatternBackend::new(width, height)) as Box<dyn CaptureBackend>)
}

/// Fails every `fail_every`-th capture and can refuse to initialize
struct MockBackend {
    init_ok: bool,
    fail_every: u64,
    delay: Duration,
    calls: Arc<AtomicU64>,
}

impl CaptureBackend for MockBackend {
    fn method(&self) -> CaptureMethod {
        CaptureMethod::TestPattern
    }

    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError> {
        if self.init_ok {
            Ok(DisplayGeometry::new(8, 8))
        } else {
            Err(CaptureError::Unavailable {
                details: "mock refused".to_string(),
            })
        }
    }

    fn capture_frame(&mut self, _timeout: Duration) -> Result<RawFrame, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_every > 0 && call % self.fail_every == 0 {
            return Err(CaptureError::frame_failed("mock failure"));
        }
        Ok(RawFrame::packed(8, 8, PixelLayout::Rgba8, vec![200; 8 * 8 * 4]))
    }

    fn geometry(&self) -> Option<DisplayGeometry> {
        Some(DisplayGeometry::new(8, 8))
    }
}

fn mock_factory(init_ok: bool, fail_every: u64, delay: Duration) -> (BackendFactory, Arc<AtomicU64>) {
    let calls = Arc::new(AtomicU64::new(0));
    let shared = Arc::clone(&calls);
    let factory: BackendFactory = Arc::new(move || {
        Box::new(MockBackend {
            init_ok,
            fail_every,
            delay,
            calls: Arc::clone(&shared),
        }) as Box<dyn CaptureBackend>
    });
    (factory, calls)
}

#[test]
fn test_capture_rate_matches_target() {
    let engine = CaptureEngineBuilder::new()
        .config(test_config(64, 48, 30))
        .backend(pattern_factory(64, 48))
        .build()
        .unwrap();

    let method = engine.start().unwrap();
    assert_eq!(method, CaptureMethod::TestPattern);
    thread::sleep(Duration::from_secs(2));
    engine.stop();

    let stats = engine.stats();
    assert!(
        (54..=66).contains(&stats.frames_captured),
        "captured {} frames",
        stats.frames_captured
    );
    assert_eq!(stats.frames_failed, 0);
    assert!(!stats.is_capturing);

    let frame = engine.latest_frame().unwrap();
    assert_eq!(frame.sequence, stats.frames_captured);
    assert!(frame.validate_size());
}

#[test]
fn test_start_fails_without_backend() {
    let (factory, _) = mock_factory(false, 0, Duration::ZERO);
    let engine = CaptureEngineBuilder::new()
        .config(test_config(8, 8, 30))
        .backend(factory)
        .build()
        .unwrap();

    let result = engine.start();
    assert!(matches!(
        result,
        Err(HeadcastError::Capture(CaptureError::Unavailable { .. }))
    ));
    assert!(!engine.is_running());
    assert!(engine.latest_frame().is_none());
}

#[test]
fn test_failed_cycles_are_counted_and_skipped() {
    let (factory, calls) = mock_factory(true, 2, Duration::ZERO);
    let engine = CaptureEngineBuilder::new()
        .config(test_config(8, 8, 100))
        .backend(factory)
        .build()
        .unwrap();

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    engine.stop();

    let stats = engine.stats();
    assert!(stats.frames_failed > 0);
    assert!(stats.frames_captured > 0);
    assert_eq!(
        stats.frames_captured + stats.frames_failed,
        calls.load(Ordering::SeqCst)
    );
}

#[test]
fn test_frames_resized_to_configured_resolution() {
    let relay = Arc::new(FrameRelay::new());
    let engine = CaptureEngineBuilder::new()
        .config(test_config(16, 12, 60))
        .relay(Arc::clone(&relay))
        .backend(pattern_factory(32, 24))
        .build()
        .unwrap();

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    engine.stop();

    let frame = relay.latest().unwrap();
    assert_eq!((frame.width, frame.height), (16, 12));
    assert_eq!(frame.data.len(), 16 * 12 * 3);
    assert_eq!(
        engine.stats().native_geometry,
        Some(DisplayGeometry::new(32, 24))
    );
}

#[test]
fn test_configure_rejects_zero_values() {
    let engine = CaptureEngine::new(&test_config(8, 8, 30), Arc::new(FrameRelay::new()));

    assert!(engine.configure(0, 720, 30, 0).is_err());
    assert!(engine.configure(1280, 720, 0, 0).is_err());
    assert!(engine.configure(1280, 720, 30, 1).is_ok());

    let stats = engine.stats();
    assert_eq!((stats.width, stats.height, stats.target_fps), (1280, 720, 30));
}

#[test]
fn test_stop_detaches_unresponsive_thread() {
    let (factory, _) = mock_factory(true, 0, Duration::from_millis(800));
    let engine = CaptureEngineBuilder::new()
        .config(test_config(8, 8, 30))
        .backend(factory)
        .stop_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    engine.stop();
    assert!(started.elapsed() < Duration::from_millis(600));
    assert!(!engine.is_running());
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let engine = CaptureEngineBuilder::new()
        .config(test_config(8, 8, 30))
        .backend(pattern_factory(8, 8))
        .build()
        .unwrap();

    engine.stop();
    assert_eq!(engine.start().unwrap(), CaptureMethod::TestPattern);
    assert_eq!(engine.start().unwrap(), CaptureMethod::TestPattern);
    engine.stop();
    engine.stop();
    assert!(!engine.is_running());
}

#[test]
fn test_select_backend_by_name() {
    let (backend, geometry) = select_backend("test_pattern", 0, 40, 30).unwrap();
    assert_eq!(backend.method(), CaptureMethod::TestPattern);
    assert_eq!(geometry, DisplayGeometry::new(40, 30));

    assert!(matches!(
        select_backend("vnc", 0, 40, 30),
        Err(CaptureError::Unavailable { .. })
    ));
}

#[test]
fn test_builder_requires_config() {
    assert!(CaptureEngineBuilder::new().build().is_err());
}

#[test]
fn test_sequence_keeps_increasing_across_restart() {
    let relay = Arc::new(FrameRelay::new());
    let engine = CaptureEngineBuilder::new()
        .config(test_config(8, 8, 60))
        .relay(Arc::clone(&relay))
        .backend(pattern_factory(8, 8))
        .build()
        .unwrap();

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    engine.stop();
    let before = relay.latest().unwrap().sequence;
    assert!(before > 0);

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    engine.stop();
    let after = relay.latest().unwrap().sequence;

    assert!(after > before, "sequence went from {} to {}", before, after);
    assert_eq!(after, engine.stats().frames_captured);
}

/// Records when each capture began; one call stalls
struct StallingBackend {
    stall_on: u64,
    stall: Duration,
    calls: u64,
    started: Arc<parking_lot::Mutex<Vec<Instant>>>,
}

impl CaptureBackend for StallingBackend {
    fn method(&self) -> CaptureMethod {
        CaptureMethod::TestPattern
    }

    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError> {
        Ok(DisplayGeometry::new(8, 8))
    }

    fn capture_frame(&mut self, _timeout: Duration) -> Result<RawFrame, CaptureError> {
        self.calls += 1;
        self.started.lock().push(Instant::now());
        if self.calls == self.stall_on {
            thread::sleep(self.stall);
        }
        Ok(RawFrame::packed(8, 8, PixelLayout::Rgb8, vec![90; 8 * 8 * 3]))
    }

    fn geometry(&self) -> Option<DisplayGeometry> {
        Some(DisplayGeometry::new(8, 8))
    }
}

#[test]
fn test_stalled_cycle_does_not_cause_catch_up_burst() {
    let started = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let shared = Arc::clone(&started);
    let stall = Duration::from_millis(200);
    let factory: BackendFactory = Arc::new(move || {
        Box::new(StallingBackend {
            stall_on: 3,
            stall,
            calls: 0,
            started: Arc::clone(&shared),
        }) as Box<dyn CaptureBackend>
    });

    // 50 fps: the stall spans ten intervals
    let engine = CaptureEngineBuilder::new()
        .config(test_config(8, 8, 50))
        .backend(factory)
        .build()
        .unwrap();
    engine.start().unwrap();
    thread::sleep(Duration::from_millis(700));
    engine.stop();

    let started = started.lock().clone();
    assert!(started.len() > 4);
    let resumed = started[2] + stall;
    let window_end = resumed + Duration::from_millis(200);
    let in_window = started
        .iter()
        .filter(|at| **at >= resumed && **at < window_end)
        .count();

    // Schedule resets after the stall: about ten frames, never the twenty of a burst
    assert!(
        (5..=14).contains(&in_window),
        "{} captures in the 200ms after the stall",
        in_window
    );
}
