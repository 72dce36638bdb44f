use crate::error::EventBusError;
use crate::tracking::GestureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Status notifications published to the outer server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeadcastEvent {
    /// Capture and broadcast loops are running
    StreamingStarted {
        width: u32,
        height: u32,
        fps: u32,
        timestamp: DateTime<Utc>,
    },
    /// Capture and broadcast loops were stopped
    StreamingStopped {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A viewer session was registered
    SessionAdded {
        session_id: String,
        viewer_count: usize,
    },
    /// A viewer session was dropped or disconnected
    SessionRemoved { session_id: String, reason: String },
    /// The gesture recognizer fired
    GestureFired {
        gesture: GestureKind,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    /// Head tracking captured a new center
    TrackingCalibrated {
        yaw_offset: f64,
        pitch_offset: f64,
        timestamp: DateTime<Utc>,
    },
    /// Head tracking state was cleared
    TrackingReset { timestamp: DateTime<Utc> },
    /// A different profile became active
    ProfileSwitched {
        profile: String,
        /// Process that triggered an automatic switch
        process: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Periodic pipeline throughput summary
    PerformanceUpdate {
        capture_fps: f64,
        stream_fps: f64,
        viewers: usize,
        injection_rate: f64,
        timestamp: DateTime<Utc>,
    },
    /// A component hit an error it absorbed
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl HeadcastEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            HeadcastEvent::StreamingStarted {
                width, height, fps, ..
            } => format!("Streaming started at {}x{} @ {}fps", width, height, fps),
            HeadcastEvent::StreamingStopped { reason, .. } => {
                format!("Streaming stopped: {}", reason)
            }
            HeadcastEvent::SessionAdded {
                session_id,
                viewer_count,
            } => format!("Session {} added ({} viewers)", session_id, viewer_count),
            HeadcastEvent::SessionRemoved { session_id, reason } => {
                format!("Session {} removed: {}", session_id, reason)
            }
            HeadcastEvent::GestureFired {
                gesture,
                confidence,
                ..
            } => format!("Gesture {} fired ({:.2})", gesture, confidence),
            HeadcastEvent::TrackingCalibrated {
                yaw_offset,
                pitch_offset,
                ..
            } => format!(
                "Tracking calibrated (yaw {:.3}, pitch {:.3})",
                yaw_offset, pitch_offset
            ),
            HeadcastEvent::TrackingReset { .. } => "Tracking reset".to_string(),
            HeadcastEvent::ProfileSwitched {
                profile, process, ..
            } => match process {
                Some(process) => format!("Profile {} activated for {}", profile, process),
                None => format!("Profile {} activated", profile),
            },
            HeadcastEvent::PerformanceUpdate {
                capture_fps,
                stream_fps,
                viewers,
                ..
            } => format!(
                "Capture {:.1}fps, stream {:.1}fps, {} viewers",
                capture_fps, stream_fps, viewers
            ),
            HeadcastEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            HeadcastEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            HeadcastEvent::StreamingStarted { .. } => "streaming_started",
            HeadcastEvent::StreamingStopped { .. } => "streaming_stopped",
            HeadcastEvent::SessionAdded { .. } => "session_added",
            HeadcastEvent::SessionRemoved { .. } => "session_removed",
            HeadcastEvent::GestureFired { .. } => "gesture_fired",
            HeadcastEvent::TrackingCalibrated { .. } => "tracking_calibrated",
            HeadcastEvent::TrackingReset { .. } => "tracking_reset",
            HeadcastEvent::ProfileSwitched { .. } => "profile_switched",
            HeadcastEvent::PerformanceUpdate { .. } => "performance_update",
            HeadcastEvent::SystemError { .. } => "system_error",
            HeadcastEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast channel shared by every component that reports status
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HeadcastEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<HeadcastEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received the event. Publishing
    /// with no subscribers is an error the caller is free to ignore.
    pub fn publish(&self, event: HeadcastEvent) -> Result<usize, EventBusError> {
        match &event {
            HeadcastEvent::StreamingStarted { .. }
            | HeadcastEvent::StreamingStopped { .. }
            | HeadcastEvent::ProfileSwitched { .. }
            | HeadcastEvent::TrackingCalibrated { .. } => {
                info!("{}", event.description());
            }
            HeadcastEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            HeadcastEvent::SessionRemoved { session_id, reason } => {
                warn!("Session {} removed: {}", session_id, reason);
            }
            HeadcastEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &HeadcastEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<HeadcastEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<HeadcastEvent>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    /// Receive the next event that passes the filter
    ///
    /// Lagging skips the missed events and keeps receiving; only a closed
    /// bus ends the stream.
    pub async fn recv(&mut self) -> Result<HeadcastEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<HeadcastEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
