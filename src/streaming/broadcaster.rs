use super::control::{ControlMessage, ControlReply};
use super::encoder::{clamp_quality, encode_jpeg, EncodedFrame};
use super::session::ViewerSession;
use super::stats::{BroadcastCounters, StreamStats};
use crate::config::StreamConfig;
use crate::error::{HeadcastError, Result, SessionSendError, StreamError};
use crate::events::{EventBus, HeadcastEvent};
use crate::relay::FrameRelay;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct StreamSettings {
    width: u32,
    height: u32,
    fps: u32,
    quality: u8,
    idle_sleep: Duration,
    encode_timeout: Duration,
    max_send_failures: u32,
}

impl StreamSettings {
    fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            quality: clamp_quality(config.quality as i64),
            idle_sleep: Duration::from_millis(config.idle_sleep_ms),
            encode_timeout: Duration::from_millis(config.encode_timeout_ms),
            max_send_failures: config.max_send_failures,
        }
    }
}

struct SessionEntry {
    session: Arc<dyn ViewerSession>,
    consecutive_failures: u32,
}

struct Worker {
    cancel: CancellationToken,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// State shared between the broadcaster handle and its thread
struct Shared {
    settings: Mutex<StreamSettings>,
    sessions: Mutex<Vec<SessionEntry>>,
    counters: BroadcastCounters,
    event_bus: Option<EventBus>,
}

impl Shared {
    fn publish(&self, event: HeadcastEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            let _ = bus.publish(event);
        }
    }

    fn remove(&self, session_id: &str, reason: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock();
            let before = sessions.len();
            sessions.retain(|entry| entry.session.id() != session_id);
            self.counters.viewers.store(sessions.len(), Ordering::Relaxed);
            before != sessions.len()
        };

        if removed {
            self.counters.sessions_removed.fetch_add(1, Ordering::Relaxed);
            self.publish(HeadcastEvent::SessionRemoved {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            });
        }
        removed
    }
}

/// Encodes the latest captured frame and fans it out to viewer sessions
///
/// Runs its own paced loop on the `headcast-stream` thread, independent of
/// the capture rate. With no viewers it idles without encoding.
pub struct StreamBroadcaster {
    shared: Arc<Shared>,
    stop_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl StreamBroadcaster {
    pub fn new(config: &StreamConfig, event_bus: Option<EventBus>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings: Mutex::new(StreamSettings::from(config)),
                sessions: Mutex::new(Vec::new()),
                counters: BroadcastCounters::new(),
                event_bus,
            }),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Start broadcasting frames taken from `frame_source`
    pub fn start(&self, frame_source: Arc<FrameRelay>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            warn!("Broadcaster already running");
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let (done_tx, done_rx) = bounded(1);

        shared.counters.mark_started();
        let handle = thread::Builder::new()
            .name("headcast-stream".to_string())
            .spawn(move || {
                run_broadcast_loop(&shared, &frame_source, &loop_cancel);
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                self.shared.counters.mark_stopped();
                error!("Failed to spawn broadcast thread: {}", e);
                StreamError::StartupFailed {
                    details: e.to_string(),
                }
            })?;

        *worker = Some(Worker {
            cancel,
            done: done_rx,
            handle,
        });

        let settings = self.shared.settings.lock().clone();
        info!(
            "Broadcaster started: {}x{} @ {}fps, quality {}",
            settings.width, settings.height, settings.fps, settings.quality
        );
        Ok(())
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
                    error!("Broadcast thread panicked");
                }
                info!("Broadcaster stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Broadcast thread did not stop within {:?}; detaching",
                    self.stop_timeout
                );
            }
        }
        self.shared.counters.mark_stopped();
    }

    /// Register a viewer; returns the new viewer count
    pub fn add_session(&self, session: Arc<dyn ViewerSession>) -> usize {
        let session_id = session.id().to_string();
        let viewer_count = {
            let mut sessions = self.shared.sessions.lock();
            sessions.retain(|entry| entry.session.id() != session_id);
            sessions.push(SessionEntry {
                session,
                consecutive_failures: 0,
            });
            self.shared
                .counters
                .viewers
                .store(sessions.len(), Ordering::Relaxed);
            sessions.len()
        };

        info!("Viewer session {} added ({} total)", session_id, viewer_count);
        self.shared.publish(HeadcastEvent::SessionAdded {
            session_id,
            viewer_count,
        });
        viewer_count
    }

    /// Drop a viewer; false if it was not registered
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.shared.remove(session_id, "disconnected")
    }

    pub fn viewer_count(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.shared
            .sessions
            .lock()
            .iter()
            .map(|entry| entry.session.id().to_string())
            .collect()
    }

    /// Change resolution, rate and quality; applies from the next cycle
    pub fn configure(
        &self,
        width: u32,
        height: u32,
        fps: u32,
        quality: i64,
    ) -> std::result::Result<(), StreamError> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(StreamError::StartupFailed {
                details: format!("invalid stream format {}x{} @ {}fps", width, height, fps),
            });
        }

        let mut settings = self.shared.settings.lock();
        settings.width = width;
        settings.height = height;
        settings.fps = fps;
        settings.quality = clamp_quality(quality);
        info!(
            "Stream configured: {}x{} @ {}fps, quality {}",
            width, height, fps, settings.quality
        );
        Ok(())
    }

    /// Set JPEG quality, clamped to 10..=100; returns the applied value
    pub fn set_quality(&self, quality: i64) -> u8 {
        let quality = clamp_quality(quality);
        self.shared.settings.lock().quality = quality;
        debug!("Stream quality set to {}", quality);
        quality
    }

    pub fn set_resolution(&self, width: u32, height: u32) -> std::result::Result<(), StreamError> {
        if width == 0 || height == 0 {
            return Err(StreamError::InvalidControlMessage {
                details: format!("invalid resolution {}x{}", width, height),
            });
        }
        let mut settings = self.shared.settings.lock();
        settings.width = width;
        settings.height = height;
        info!("Stream resolution set to {}x{}", width, height);
        Ok(())
    }

    /// Apply a viewer control message and build the reply
    pub fn handle_control(
        &self,
        message: &ControlMessage,
    ) -> std::result::Result<ControlReply, StreamError> {
        match message {
            ControlMessage::QualityChange { quality } => Ok(ControlReply::QualityChanged {
                quality: self.set_quality(*quality),
            }),
            ControlMessage::ResolutionChange { width, height } => {
                self.set_resolution(*width, *height)?;
                Ok(ControlReply::ResolutionChanged {
                    width: *width,
                    height: *height,
                })
            }
            ControlMessage::Ping { timestamp } => Ok(ControlReply::pong(*timestamp)),
        }
    }

    pub fn stats(&self) -> StreamStats {
        let settings = self.shared.settings.lock().clone();
        self.shared.counters.snapshot(
            settings.quality,
            settings.width,
            settings.height,
            settings.fps,
        )
    }
}

impl Drop for StreamBroadcaster {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_broadcast_loop(shared: &Shared, relay: &FrameRelay, cancel: &CancellationToken) {
    let mut next_cycle = Instant::now();
    let mut last_sequence: Option<u64> = None;
    debug!("Broadcast loop running");

    while !cancel.is_cancelled() {
        let cycle = shared.settings.lock().clone();
        let interval = cycle.interval();

        let now = Instant::now();
        if next_cycle > now {
            thread::sleep(next_cycle - now);
            if cancel.is_cancelled() {
                break;
            }
        } else if now.duration_since(next_cycle) > interval {
            trace!("Broadcast loop behind schedule, resetting");
            next_cycle = now;
        }
        next_cycle += interval;

        let targets: Vec<Arc<dyn ViewerSession>> = shared
            .sessions
            .lock()
            .iter()
            .map(|entry| Arc::clone(&entry.session))
            .collect();

        if targets.is_empty() {
            shared
                .counters
                .cycles_skipped_no_viewers
                .fetch_add(1, Ordering::Relaxed);
            thread::sleep(cycle.idle_sleep);
            next_cycle = Instant::now();
            continue;
        }

        let Some(frame) = relay.latest() else {
            shared
                .counters
                .cycles_without_frame
                .fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let encode_started = Instant::now();
        let encoded = match encode_jpeg(&frame, cycle.width, cycle.height, cycle.quality) {
            Ok(_) if encode_started.elapsed() > cycle.encode_timeout => {
                shared.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Encode of frame {} took {:?}, dropped as stale",
                    frame.sequence,
                    encode_started.elapsed()
                );
                continue;
            }
            Ok(encoded) => Arc::new(encoded),
            Err(e) => {
                shared.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Encode of frame {} failed: {}", frame.sequence, e);
                continue;
            }
        };

        if last_sequence == Some(frame.sequence) {
            shared.counters.frames_repeated.fetch_add(1, Ordering::Relaxed);
        }
        last_sequence = Some(frame.sequence);

        let delivered = fan_out(shared, &targets, &encoded, cycle.max_send_failures);
        if delivered > 0 {
            shared.counters.record_sent(encoded.len() * delivered);
        }
    }

    debug!("Broadcast loop exited");
}

/// Send one payload to every target and update session health
///
/// Returns the number of sessions that accepted the frame.
fn fan_out(
    shared: &Shared,
    targets: &[Arc<dyn ViewerSession>],
    frame: &Arc<EncodedFrame>,
    max_send_failures: u32,
) -> usize {
    let results: Vec<(String, std::result::Result<(), SessionSendError>)> = targets
        .iter()
        .map(|session| (session.id().to_string(), session.send(frame)))
        .collect();

    let mut delivered = 0;
    let mut doomed = Vec::new();
    {
        let mut sessions = shared.sessions.lock();
        for (session_id, result) in &results {
            let Some(entry) = sessions
                .iter_mut()
                .find(|entry| entry.session.id() == session_id)
            else {
                continue;
            };

            match result {
                Ok(()) => {
                    entry.consecutive_failures = 0;
                    delivered += 1;
                }
                Err(SessionSendError::Full) => {
                    entry.consecutive_failures += 1;
                    trace!(
                        "Session {} buffer full, frame {} dropped",
                        session_id,
                        frame.sequence
                    );
                    if entry.consecutive_failures > max_send_failures {
                        doomed.push((
                            session_id.clone(),
                            format!("{} consecutive send failures", entry.consecutive_failures),
                        ));
                    }
                }
                Err(SessionSendError::Closed) => {
                    doomed.push((session_id.clone(), "transport closed".to_string()));
                }
            }
        }
    }

    for (session_id, reason) in doomed {
        let failure = StreamError::SessionSendFailed {
            session_id: session_id.clone(),
            details: reason.clone(),
        };
        debug!("{}", failure);
        shared.remove(&session_id, &reason);
    }

    delivered
}

/// Builder for a stream broadcaster
pub struct StreamBroadcasterBuilder {
    config: Option<StreamConfig>,
    event_bus: Option<EventBus>,
    stop_timeout: Option<Duration>,
}

impl StreamBroadcasterBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            event_bus: None,
            stop_timeout: None,
        }
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<StreamBroadcaster> {
        let config = self
            .config
            .ok_or_else(|| HeadcastError::system("Stream configuration must be specified"))?;

        let mut broadcaster = StreamBroadcaster::new(&config, self.event_bus);
        if let Some(timeout) = self.stop_timeout {
            broadcaster.stop_timeout = timeout;
        }
        Ok(broadcaster)
    }
}

impl Default for StreamBroadcasterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
