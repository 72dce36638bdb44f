use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Counters updated by the broadcast loop
#[derive(Debug)]
pub(crate) struct BroadcastCounters {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub cycles_skipped_no_viewers: AtomicU64,
    pub cycles_without_frame: AtomicU64,
    pub encode_failures: AtomicU64,
    pub frames_repeated: AtomicU64,
    pub sessions_removed: AtomicU64,
    pub viewers: AtomicUsize,
    started: Mutex<Option<Instant>>,
}

impl BroadcastCounters {
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            cycles_skipped_no_viewers: AtomicU64::new(0),
            cycles_without_frame: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            frames_repeated: AtomicU64::new(0),
            sessions_removed: AtomicU64::new(0),
            viewers: AtomicUsize::new(0),
            started: Mutex::new(None),
        }
    }

    pub fn mark_started(&self) {
        *self.started.lock() = Some(Instant::now());
    }

    pub fn mark_stopped(&self) {
        *self.started.lock() = None;
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, quality: u8, width: u32, height: u32, target_fps: u32) -> StreamStats {
        let uptime_secs = self
            .started
            .lock()
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or_default();
        let frames_sent = self.frames_sent.load(Ordering::Relaxed);
        let bytes_sent = self.bytes_sent.load(Ordering::Relaxed);

        let (fps, bitrate_kbps) = if uptime_secs > 0.0 {
            (
                frames_sent as f64 / uptime_secs,
                bytes_sent as f64 * 8.0 / 1000.0 / uptime_secs,
            )
        } else {
            (0.0, 0.0)
        };

        StreamStats {
            is_streaming: uptime_secs > 0.0,
            frames_sent,
            bytes_sent,
            fps,
            bitrate_kbps,
            viewers: self.viewers.load(Ordering::Relaxed),
            cycles_skipped_no_viewers: self.cycles_skipped_no_viewers.load(Ordering::Relaxed),
            cycles_without_frame: self.cycles_without_frame.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            frames_repeated: self.frames_repeated.load(Ordering::Relaxed),
            sessions_removed: self.sessions_removed.load(Ordering::Relaxed),
            uptime_secs,
            quality,
            width,
            height,
            target_fps,
        }
    }
}

/// Snapshot of broadcaster statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    pub is_streaming: bool,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Effective send rate since start
    pub fps: f64,
    /// Average payload bitrate since start
    pub bitrate_kbps: f64,
    pub viewers: usize,
    /// Idle cycles with no connected viewer
    pub cycles_skipped_no_viewers: u64,
    /// Cycles with viewers but nothing captured yet
    pub cycles_without_frame: u64,
    pub encode_failures: u64,
    /// Frames re-sent because capture had not produced a new one
    pub frames_repeated: u64,
    pub sessions_removed: u64,
    pub uptime_secs: f64,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl StreamStats {
    /// Share of cycles with viewers that produced a payload
    pub fn efficiency(&self) -> f64 {
        let attempted = self.frames_sent + self.encode_failures + self.cycles_without_frame;
        if attempted > 0 {
            self.frames_sent as f64 / attempted as f64
        } else {
            1.0
        }
    }
}
