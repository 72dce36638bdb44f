use super::*;
use crate::capture::CaptureMethod;
use crate::config::HeadcastConfig;
use crate::error::{HeadcastError, InjectionError, TrackingError};
use crate::events::HeadcastEvent;
use crate::injection::{InjectionOutcome, InputSurface, MockInputSurface, SurfaceCall, SurfaceKind};
use crate::tracking::{EulerAngles, GestureKind, Quaternion, TrackerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn test_config() -> HeadcastConfig {
    let mut config = HeadcastConfig::default();
    config.capture.backend = "test_pattern".to_string();
    config.capture.width = 64;
    config.capture.height = 48;
    config.capture.fps = 30;
    config.stream.width = 32;
    config.stream.height = 24;
    config.stream.fps = 30;
    config.stream.idle_sleep_ms = 10;
    config.input.key_hold_ms = 0;
    config.system.stop_timeout_ms = 500;
    config
}

fn mock_pipeline(config: HeadcastConfig) -> (Arc<HeadcastPipeline>, MockInputSurface) {
    let surface = MockInputSurface::new();
    let handle = surface.clone();
    let pipeline = HeadcastPipelineBuilder::new()
        .config(config)
        .input_surface(Arc::new(move || {
            Some(Box::new(surface.clone()) as Box<dyn InputSurface>)
        }))
        .build()
        .unwrap();
    (Arc::new(pipeline), handle)
}

fn pose_json(yaw_deg: f64, pitch_deg: f64, timestamp: f64) -> String {
    let q = Quaternion::from_euler(EulerAngles::new(
        0.0,
        pitch_deg.to_radians(),
        yaw_deg.to_radians(),
    ));
    format!(
        r#"{{"pose": {{"quaternion": [{}, {}, {}, {}], "position": [0.0, 0.0, 0.0]}}, "timestamp": {}}}"#,
        q.x, q.y, q.z, q.w, timestamp
    )
}

#[tokio::test]
async fn test_streaming_delivers_jpeg_to_viewer() {
    let (pipeline, _) = mock_pipeline(test_config());
    let mut events = pipeline.event_bus().subscribe();

    let method = pipeline.start_streaming().await.unwrap();
    assert_eq!(method, CaptureMethod::TestPattern);
    assert!(pipeline.is_streaming());

    let (session_id, mut frames) = pipeline.open_channel_session();
    let frame = timeout(Duration::from_secs(3), frames.recv())
        .await
        .expect("no frame within 3s")
        .expect("session closed");
    assert_eq!((frame.width, frame.height), (32, 24));
    assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);

    assert!(pipeline.remove_session(&session_id));
    pipeline.stop_streaming().await.unwrap();
    assert!(!pipeline.is_streaming());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type());
    }
    assert!(seen.contains(&"streaming_started"));
    assert!(seen.contains(&"session_added"));
    assert!(seen.contains(&"streaming_stopped"));

    let components = pipeline.get_all_component_states().await;
    assert_eq!(components.get("capture"), Some(&ComponentState::Stopped));
    assert_eq!(components.get("stream"), Some(&ComponentState::Stopped));
}

#[tokio::test]
async fn test_pose_moves_mouse_after_calibration() {
    let (pipeline, surface) = mock_pipeline(test_config());
    assert_eq!(pipeline.start_tracking().await.unwrap(), SurfaceKind::Mock);

    // Uncalibrated: no input
    let outcome = pipeline.handle_pose_event(&pose_json(0.0, 0.0, 0.0)).await.unwrap();
    assert!(outcome.input.is_none());
    pipeline.calibrate().await.unwrap();

    // First sample after calibration only primes the delta
    let outcome = pipeline.handle_pose_event(&pose_json(5.0, 0.0, 0.1)).await.unwrap();
    assert!(outcome.input.is_none());

    let outcome = pipeline.handle_pose_event(&pose_json(5.0, 0.0, 0.2)).await.unwrap();
    assert!(outcome.input.is_some());
    assert_eq!(outcome.injected, vec![InjectionOutcome::Injected]);

    let calls = surface.calls();
    assert_eq!(calls.len(), 1);
    match calls[0] {
        SurfaceCall::Move { dx, dy } => {
            assert_ne!(dx, 0);
            assert_eq!(dy, 0);
        }
        ref other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_pose_rejected_without_side_effects() {
    let (pipeline, surface) = mock_pipeline(test_config());
    pipeline.start_tracking().await.unwrap();

    for text in [
        "{not json",
        r#"{"quaternion": [0.0, 0.0, 1.0], "timestamp": 1.0}"#,
        r#"{"quaternion": [0.0, 0.0, 0.0, 0.0], "timestamp": 1.0}"#,
        r#"{"pose": {"quaternion": [0.0, 0.0, 0.0, 1.0], "position": [1.0, 2.0]}}"#,
    ] {
        assert!(matches!(
            pipeline.handle_pose_event(text).await,
            Err(HeadcastError::Tracking(TrackingError::InvalidPose { .. }))
        ));
    }

    let stats = pipeline.get_stats().await;
    assert_eq!(stats.tracker.samples_received, 0);
    assert_eq!(surface.call_count(), 0);
}

#[tokio::test]
async fn test_bound_gesture_injects_key() {
    let mut config = test_config();
    config
        .profiles
        .get_mut("default")
        .unwrap()
        .gestures
        .insert("nod".to_string(), "space".to_string());
    let (pipeline, surface) = mock_pipeline(config);
    let mut events = pipeline.event_bus().subscribe();
    pipeline.start_tracking().await.unwrap();

    let mut fired = Vec::new();
    for (i, pitch) in [0.0, 5.0, 10.0, 5.0, 0.0, 5.0, 10.0, 15.0].iter().enumerate() {
        let outcome = pipeline
            .handle_pose_event(&pose_json(0.0, *pitch, i as f64 * 0.01))
            .await
            .unwrap();
        if let Some(gesture) = outcome.gesture {
            fired.push(gesture.kind);
        }
    }

    assert_eq!(fired, vec![GestureKind::Nod]);
    assert_eq!(
        surface.calls(),
        vec![
            SurfaceCall::Key {
                name: "space",
                pressed: true
            },
            SurfaceCall::Key {
                name: "space",
                pressed: false
            },
        ]
    );

    let mut gesture_events = 0;
    while let Ok(event) = events.try_recv() {
        if let HeadcastEvent::GestureFired { gesture, .. } = event {
            assert_eq!(gesture, GestureKind::Nod);
            gesture_events += 1;
        }
    }
    assert_eq!(gesture_events, 1);
}

#[tokio::test]
async fn test_switch_profile() {
    let (pipeline, _) = mock_pipeline(test_config());
    let mut events = pipeline.event_bus().subscribe();

    assert!(pipeline.switch_profile("missing").await.is_err());
    assert_eq!(pipeline.active_profile().name, "default");

    pipeline.switch_profile("racing").await.unwrap();
    assert_eq!(pipeline.active_profile().name, "racing");
    assert_eq!(pipeline.get_stats().await.tracker.profile, "racing");

    match events.recv().await.unwrap() {
        HeadcastEvent::ProfileSwitched {
            profile, process, ..
        } => {
            assert_eq!(profile, "racing");
            assert!(process.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }

    let mut invalid = pipeline.active_profile();
    invalid.head_tracking.smoothing = 0.0;
    assert!(pipeline.apply_profile(invalid).await.is_err());
    assert_eq!(pipeline.active_profile().head_tracking.smoothing, 0.3);
}

#[tokio::test]
async fn test_process_detection_switches_profile() {
    let mut config = test_config();
    config.profiles.get_mut("shooter").unwrap().process_patterns = vec!["Game.exe".to_string()];
    let (pipeline, _) = mock_pipeline(config.clone());

    assert_eq!(
        pipeline.on_process_detected("game.exe").await.unwrap(),
        Some("shooter".to_string())
    );
    assert_eq!(pipeline.active_profile().name, "shooter");
    // Already active
    assert_eq!(pipeline.on_process_detected("game.exe").await.unwrap(), None);
    // Wildcard profiles never match a detection
    assert_eq!(pipeline.on_process_detected("editor.exe").await.unwrap(), None);

    config.tracking.auto_profile_switch = false;
    let (pipeline, _) = mock_pipeline(config);
    assert_eq!(pipeline.on_process_detected("game.exe").await.unwrap(), None);
    assert_eq!(pipeline.active_profile().name, "default");
}

#[tokio::test]
async fn test_tracking_controls() {
    let (pipeline, _) = mock_pipeline(test_config());

    // No pose seen yet
    assert!(pipeline.calibrate().await.is_err());

    pipeline.start_tracking().await.unwrap();
    pipeline.handle_pose_event(&pose_json(10.0, 0.0, 1.0)).await.unwrap();
    let calibration = pipeline.calibrate().await.unwrap();
    assert!((calibration.yaw_offset.to_degrees() - 10.0).abs() < 1e-6);

    pipeline.reset_tracking().await;
    assert_ne!(
        pipeline.get_stats().await.tracker.state,
        TrackerState::Calibrated
    );

    pipeline.stop_tracking().await;
    assert_eq!(
        pipeline.get_component_state("tracking").await,
        Some(ComponentState::Stopped)
    );
    assert!(!pipeline.get_stats().await.injection.is_running);
}

#[tokio::test]
async fn test_start_tracking_without_surface() {
    let pipeline = HeadcastPipelineBuilder::new()
        .config(test_config())
        .input_surface(Arc::new(|| None))
        .build()
        .unwrap();

    assert!(matches!(
        pipeline.start_tracking().await,
        Err(HeadcastError::Injection(InjectionError::Unavailable))
    ));
    assert_eq!(
        pipeline.get_component_state("tracking").await,
        Some(ComponentState::Failed)
    );
}

#[tokio::test]
async fn test_configure_and_control_messages() {
    let (pipeline, _) = mock_pipeline(test_config());

    pipeline.configure_capture(320, 240, 60, 0).unwrap();
    assert!(pipeline.configure_capture(0, 240, 60, 0).is_err());
    pipeline.configure_stream(160, 120, 20, 150).unwrap();

    let stats = pipeline.get_stats().await;
    assert_eq!((stats.capture.width, stats.capture.height), (320, 240));
    assert_eq!(stats.stream.quality, 100);
    assert_eq!(stats.stream.target_fps, 20);

    let reply = pipeline
        .handle_control_message(r#"{"type": "quality_change", "quality": 40}"#)
        .unwrap();
    assert!(reply.to_json().contains("quality_changed"));
    assert!(pipeline.handle_control_message("nonsense").is_err());
}

#[tokio::test]
async fn test_stats_serialize() {
    let (pipeline, _) = mock_pipeline(test_config());
    let stats = pipeline.get_stats().await;
    let json = serde_json::to_value(&stats).unwrap();

    for section in ["capture", "relay", "stream", "tracker", "gesture", "injection"] {
        assert!(json.get(section).is_some(), "missing {}", section);
    }
    assert_eq!(json["active_profile"], "default");
}

#[tokio::test]
async fn test_run_until_shutdown_requested() {
    let (pipeline, _) = mock_pipeline(test_config());
    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run().await })
    };

    // Give run() time to start tracking
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pipeline.request_shutdown(ShutdownReason::UserRequest));
    assert!(!pipeline.request_shutdown(ShutdownReason::UserRequest));

    let exit_code = timeout(Duration::from_secs(10), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        pipeline.get_component_state("tracking").await,
        Some(ComponentState::Stopped)
    );
}

#[test]
fn test_builder_validates_config() {
    assert!(HeadcastPipelineBuilder::new().build().is_err());

    let mut config = test_config();
    config.system.active_profile = "nope".to_string();
    assert!(HeadcastPipelineBuilder::new().config(config).build().is_err());
}
