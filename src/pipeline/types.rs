use crate::capture::CaptureStats;
use crate::injection::{InjectionOutcome, InjectionStats};
use crate::relay::RelayStatsSnapshot;
use crate::streaming::StreamStats;
use crate::tracking::{GestureEvent, GestureStats, ProcessedInput, TrackerStats};
use serde::Serialize;
use std::collections::BTreeMap;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// What one pose event turned into
#[derive(Debug, Clone, Default)]
pub struct PoseOutcome {
    /// Movement emitted by the tracker
    pub input: Option<ProcessedInput>,
    /// Gesture recognized on this sample
    pub gesture: Option<GestureEvent>,
    /// Result of injecting the movement and any bound gesture action
    pub injected: Vec<InjectionOutcome>,
}

/// Snapshot of every component, serializable for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub active_profile: String,
    pub uptime_secs: f64,
    pub components: BTreeMap<String, ComponentState>,
    pub capture: CaptureStats,
    pub relay: RelayStatsSnapshot,
    pub stream: StreamStats,
    pub tracker: TrackerStats,
    pub gesture: GestureStats,
    pub injection: InjectionStats,
}
