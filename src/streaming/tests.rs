use super::*;
use crate::config::{HeadcastConfig, StreamConfig};
use crate::error::{SessionSendError, StreamError};
use crate::events::{EventBus, HeadcastEvent};
use crate::frame::Frame;
use crate::relay::FrameRelay;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn stream_config(width: u32, height: u32, fps: u32) -> StreamConfig {
    let mut config = HeadcastConfig::default().stream;
    config.width = width;
    config.height = height;
    config.fps = fps;
    config.idle_sleep_ms = 10;
    config.encode_timeout_ms = 1000;
    config.max_send_failures = 3;
    config
}

fn gradient_frame(sequence: u64, width: u32, height: u32) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x * 255 / width) as u8, (y * 255 / height) as u8, 96]);
        }
    }
    Frame::new(sequence, SystemTime::now(), data, width, height)
}

fn relay_with_frame(width: u32, height: u32) -> Arc<FrameRelay> {
    let relay = Arc::new(FrameRelay::new());
    relay.publish(Arc::new(gradient_frame(1, width, height)));
    relay
}

/// Records every sequence it receives
struct RecordingSession {
    id: String,
    received: Mutex<Vec<u64>>,
}

impl RecordingSession {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            received: Mutex::new(Vec::new()),
        })
    }
}

impl ViewerSession for RecordingSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, frame: &Arc<EncodedFrame>) -> Result<(), SessionSendError> {
        self.received.lock().push(frame.sequence);
        Ok(())
    }
}

/// Never accepts a frame
struct FailingSession {
    id: String,
    error: SessionSendError,
    attempts: AtomicU64,
}

impl ViewerSession for FailingSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, _frame: &Arc<EncodedFrame>) -> Result<(), SessionSendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error)
    }
}

#[test]
fn test_no_viewers_skips_encoding() {
    let broadcaster = StreamBroadcasterBuilder::new()
        .config(stream_config(32, 24, 60))
        .build()
        .unwrap();

    broadcaster.start(relay_with_frame(32, 24)).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    broadcaster.stop();

    let stats = broadcaster.stats();
    assert!(stats.cycles_skipped_no_viewers > 0);
    assert_eq!(stats.frames_sent, 0);
    assert_eq!(stats.bytes_sent, 0);
    assert_eq!(stats.encode_failures, 0);
}

#[tokio::test]
async fn test_failing_sessions_removed_healthy_keep_receiving() {
    let event_bus = EventBus::new(64);
    let mut events = event_bus.subscribe();
    let broadcaster = StreamBroadcasterBuilder::new()
        .config(stream_config(32, 24, 50))
        .event_bus(event_bus.clone())
        .build()
        .unwrap();

    let healthy = RecordingSession::new("healthy");
    let congested = Arc::new(FailingSession {
        id: "congested".to_string(),
        error: SessionSendError::Full,
        attempts: AtomicU64::new(0),
    });
    let (closed, receiver) = ChannelSession::with_id("closed", 2);
    drop(receiver);

    broadcaster.add_session(healthy.clone());
    broadcaster.add_session(congested.clone());
    assert_eq!(broadcaster.add_session(Arc::new(closed)), 3);

    broadcaster.start(relay_with_frame(32, 24)).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    broadcaster.stop();

    assert_eq!(broadcaster.session_ids(), vec!["healthy".to_string()]);
    // Removed after exceeding the limit of three consecutive failures
    assert_eq!(congested.attempts.load(Ordering::SeqCst), 4);
    assert!(healthy.received.lock().len() >= 5);

    let stats = broadcaster.stats();
    assert_eq!(stats.sessions_removed, 2);
    assert_eq!(stats.viewers, 1);

    let mut removed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let HeadcastEvent::SessionRemoved { session_id, .. } = event {
            removed.push(session_id);
        }
    }
    removed.sort();
    assert_eq!(removed, vec!["closed".to_string(), "congested".to_string()]);
}

#[test]
fn test_stalled_capture_repeats_last_frame() {
    let broadcaster = StreamBroadcasterBuilder::new()
        .config(stream_config(16, 12, 50))
        .build()
        .unwrap();
    let viewer = RecordingSession::new("viewer");
    broadcaster.add_session(viewer.clone());

    broadcaster.start(relay_with_frame(16, 12)).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    broadcaster.stop();

    let stats = broadcaster.stats();
    assert!(stats.frames_sent > 1);
    assert_eq!(stats.frames_repeated, stats.frames_sent - 1);
    assert!(viewer.received.lock().iter().all(|sequence| *sequence == 1));
}

#[test]
fn test_cycles_without_frame_are_counted() {
    let broadcaster = StreamBroadcasterBuilder::new()
        .config(stream_config(16, 12, 50))
        .build()
        .unwrap();
    broadcaster.add_session(RecordingSession::new("viewer"));

    broadcaster.start(Arc::new(FrameRelay::new())).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    broadcaster.stop();

    let stats = broadcaster.stats();
    assert!(stats.cycles_without_frame > 0);
    assert_eq!(stats.frames_sent, 0);
}

#[test]
fn test_encoded_payload_is_jpeg() {
    let frame = gradient_frame(7, 64, 48);
    let encoded = encode_jpeg(&frame, 64, 48, 85).unwrap();

    assert_eq!(encoded.sequence, 7);
    assert_eq!(encoded.format, PayloadFormat::Jpeg);
    assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
    assert_eq!(&encoded.data[encoded.len() - 2..], &[0xFF, 0xD9]);
}

#[test]
fn test_encode_resizes_to_stream_resolution() {
    let frame = gradient_frame(1, 64, 48);
    let encoded = encode_jpeg(&frame, 32, 24, 70).unwrap();

    assert_eq!((encoded.width, encoded.height), (32, 24));
    let decoded = image::load_from_memory(&encoded.data).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 24));

    let header = encoded.header();
    assert_eq!(header.kind, "video_frame");
    assert_eq!(header.size, encoded.len());
}

#[test]
fn test_encode_rejects_short_frame() {
    let frame = Frame::new(1, SystemTime::now(), vec![0; 10], 64, 48);
    assert!(matches!(
        encode_jpeg(&frame, 64, 48, 85),
        Err(StreamError::EncodeFailed { .. })
    ));
}

#[test]
fn test_quality_clamped() {
    assert_eq!(clamp_quality(5), MIN_QUALITY);
    assert_eq!(clamp_quality(150), MAX_QUALITY);
    assert_eq!(clamp_quality(85), 85);

    let broadcaster = StreamBroadcaster::new(&stream_config(16, 12, 30), None);
    assert_eq!(broadcaster.set_quality(-3), 10);
    assert_eq!(broadcaster.stats().quality, 10);
}

#[test]
fn test_control_messages() {
    let broadcaster = StreamBroadcaster::new(&stream_config(16, 12, 30), None);

    let message = ControlMessage::parse(r#"{"type": "quality_change", "quality": 150}"#).unwrap();
    assert_eq!(message, ControlMessage::QualityChange { quality: 150 });
    assert_eq!(
        broadcaster.handle_control(&message).unwrap(),
        ControlReply::QualityChanged { quality: 100 }
    );

    let message =
        ControlMessage::parse(r#"{"type": "resolution_change", "width": 1280, "height": 720}"#)
            .unwrap();
    broadcaster.handle_control(&message).unwrap();
    let stats = broadcaster.stats();
    assert_eq!((stats.width, stats.height), (1280, 720));

    let message = ControlMessage::parse(r#"{"type": "ping", "timestamp": 12.5}"#).unwrap();
    match broadcaster.handle_control(&message).unwrap() {
        ControlReply::Pong {
            timestamp,
            server_timestamp,
        } => {
            assert_eq!(timestamp, Some(12.5));
            assert!(server_timestamp > 0.0);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(ControlReply::pong(None).to_json().contains("\"type\":\"pong\""));

    let message = ControlMessage::ResolutionChange {
        width: 0,
        height: 720,
    };
    assert!(broadcaster.handle_control(&message).is_err());
    assert!(matches!(
        ControlMessage::parse(r#"{"type": "explode"}"#),
        Err(StreamError::InvalidControlMessage { .. })
    ));
}

#[test]
fn test_channel_session_backpressure() {
    let (session, mut receiver) = ChannelSession::new(1);
    assert_eq!(session.id().len(), 36);

    let frame = Arc::new(encode_jpeg(&gradient_frame(1, 8, 8), 8, 8, 50).unwrap());
    assert_eq!(session.send(&frame), Ok(()));
    assert_eq!(session.send(&frame), Err(SessionSendError::Full));

    assert_eq!(receiver.try_recv().unwrap().sequence, 1);
    drop(receiver);
    assert_eq!(session.send(&frame), Err(SessionSendError::Closed));
}

#[tokio::test]
async fn test_session_events() {
    let event_bus = EventBus::new(16);
    let mut events = event_bus.subscribe();
    let broadcaster = StreamBroadcaster::new(&stream_config(16, 12, 30), Some(event_bus));

    broadcaster.add_session(RecordingSession::new("a"));
    assert!(broadcaster.remove_session("a"));
    assert!(!broadcaster.remove_session("a"));
    assert_eq!(broadcaster.viewer_count(), 0);

    assert!(matches!(
        events.recv().await.unwrap(),
        HeadcastEvent::SessionAdded { viewer_count: 1, .. }
    ));
    match events.recv().await.unwrap() {
        HeadcastEvent::SessionRemoved { session_id, reason } => {
            assert_eq!(session_id, "a");
            assert_eq!(reason, "disconnected");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_builder_requires_config() {
    assert!(StreamBroadcasterBuilder::new().build().is_err());
}

/// Accepts every frame; one send stalls
struct StallingSession {
    stall_on: usize,
    stall: Duration,
    sent_at: Mutex<Vec<std::time::Instant>>,
}

impl ViewerSession for StallingSession {
    fn id(&self) -> &str {
        "stalling"
    }

    fn send(&self, _frame: &Arc<EncodedFrame>) -> Result<(), SessionSendError> {
        let count = {
            let mut sent_at = self.sent_at.lock();
            sent_at.push(std::time::Instant::now());
            sent_at.len()
        };
        if count == self.stall_on {
            std::thread::sleep(self.stall);
        }
        Ok(())
    }
}

#[test]
fn test_slow_send_does_not_cause_catch_up_burst() {
    let stall = Duration::from_millis(200);
    let session = Arc::new(StallingSession {
        stall_on: 3,
        stall,
        sent_at: Mutex::new(Vec::new()),
    });
    // 50 fps: the stall spans ten intervals
    let broadcaster = StreamBroadcasterBuilder::new()
        .config(stream_config(16, 12, 50))
        .build()
        .unwrap();
    broadcaster.add_session(session.clone());

    broadcaster.start(relay_with_frame(16, 12)).unwrap();
    std::thread::sleep(Duration::from_millis(700));
    broadcaster.stop();

    let sent_at = session.sent_at.lock().clone();
    assert!(sent_at.len() > 4);
    let resumed = sent_at[2] + stall;
    let window_end = resumed + Duration::from_millis(200);
    let in_window = sent_at
        .iter()
        .filter(|at| **at >= resumed && **at < window_end)
        .count();

    assert!(
        (5..=14).contains(&in_window),
        "{} sends in the 200ms after the stall",
        in_window
    );
}
