use super::euler::{wrap_degrees, Quaternion};
use super::pose::{PoseSample, Vector3};
use crate::error::TrackingError;
use crate::profile::{HeadTrackingSettings, Profile};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Deltas at or below this on both axes produce no input
pub const MIN_EMIT_DELTA: f64 = 0.1;

/// Where a processed input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    HeadTracking,
    Gesture,
}

/// Discrete action riding along with (or instead of) a mouse delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputAction {
    /// Press and release a key or mouse button by logical name
    Press { key: String },
    /// Scroll by wheel units, positive is up
    Scroll { amount: i32 },
}

/// Input derived from head movement, consumed once by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedInput {
    pub mouse_delta_x: f64,
    pub mouse_delta_y: f64,
    pub action: Option<InputAction>,
    pub timestamp: f64,
    pub source: InputSource,
}

impl ProcessedInput {
    /// An action with no mouse movement
    pub fn action(action: InputAction, timestamp: f64, source: InputSource) -> Self {
        Self {
            mouse_delta_x: 0.0,
            mouse_delta_y: 0.0,
            action: Some(action),
            timestamp,
            source,
        }
    }
}

/// Yaw/pitch center captured at calibration, in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub yaw_offset: f64,
    pub pitch_offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    #[default]
    Inactive,
    Uncalibrated,
    Calibrated,
}

/// Snapshot of tracker counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    pub state: TrackerState,
    pub profile: String,
    pub samples_received: u64,
    pub frames_processed: u64,
    pub inputs_emitted: u64,
    pub fps: f64,
    pub uptime_secs: f64,
}

/// Turns headset poses into calibrated, smoothed mouse deltas
///
/// Not meant to be shared between sources: callers serialize access per
/// tracker, one tracker per logical session.
pub struct PoseTracker {
    settings: HeadTrackingSettings,
    profile_name: String,
    active: bool,
    calibration: Option<Calibration>,
    last_pose: Option<PoseSample>,
    smoothed_yaw: f64,
    smoothed_pitch: f64,
    /// Timestamp of the previous processed sample since calibration
    previous_timestamp: Option<f64>,
    samples_received: u64,
    frames_processed: u64,
    inputs_emitted: u64,
    started_at: Option<Instant>,
}

impl PoseTracker {
    pub fn new(profile: &Profile) -> Self {
        Self {
            settings: profile.head_tracking.clone(),
            profile_name: profile.name.clone(),
            active: false,
            calibration: None,
            last_pose: None,
            smoothed_yaw: 0.0,
            smoothed_pitch: 0.0,
            previous_timestamp: None,
            samples_received: 0,
            frames_processed: 0,
            inputs_emitted: 0,
            started_at: None,
        }
    }

    /// Replace the tuning snapshot
    ///
    /// Calibration and smoothing state are kept so a profile switch does not
    /// make the view jump.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.settings = profile.head_tracking.clone();
        self.profile_name = profile.name.clone();
        info!(
            "Head tracking profile '{}' applied (deadzone {:.2}, smoothing {:.2}, max speed {:.0})",
            self.profile_name, self.settings.deadzone, self.settings.smoothing, self.settings.max_speed
        );
    }

    pub fn settings(&self) -> &HeadTrackingSettings {
        &self.settings
    }

    pub fn start_tracking(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        self.started_at = Some(Instant::now());
        self.frames_processed = 0;
        info!("Head tracking started");
    }

    pub fn stop_tracking(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        info!(
            "Head tracking stopped after {} processed frames",
            self.frames_processed
        );
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn state(&self) -> TrackerState {
        match (self.active, self.calibration.is_some()) {
            (false, _) => TrackerState::Inactive,
            (true, false) => TrackerState::Uncalibrated,
            (true, true) => TrackerState::Calibrated,
        }
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    pub fn last_pose(&self) -> Option<&PoseSample> {
        self.last_pose.as_ref()
    }

    /// Use the most recent pose as the new center
    pub fn calibrate(&mut self) -> Result<Calibration, TrackingError> {
        let Some(pose) = self.last_pose else {
            warn!("Calibration requested before any pose sample arrived");
            return Err(TrackingError::NotCalibrated);
        };

        let angles = pose.orientation.to_euler();
        let calibration = Calibration {
            yaw_offset: angles.yaw,
            pitch_offset: angles.pitch,
        };

        self.calibration = Some(calibration);
        self.smoothed_yaw = 0.0;
        self.smoothed_pitch = 0.0;
        self.previous_timestamp = None;

        info!(
            "Head tracking calibrated (yaw {:.1}°, pitch {:.1}°)",
            calibration.yaw_offset.to_degrees(),
            calibration.pitch_offset.to_degrees()
        );
        Ok(calibration)
    }

    /// Forget calibration, smoothing state and the last pose
    pub fn reset_tracking(&mut self) {
        self.calibration = None;
        self.last_pose = None;
        self.smoothed_yaw = 0.0;
        self.smoothed_pitch = 0.0;
        self.previous_timestamp = None;
        info!("Head tracking reset");
    }

    /// Process one pose given as raw components
    pub fn process_pose(
        &mut self,
        orientation: Quaternion,
        position: Vector3,
        timestamp: f64,
    ) -> Option<ProcessedInput> {
        self.process_sample(&PoseSample::new(orientation, position, timestamp))
    }

    /// Process one pose sample
    ///
    /// Returns `None` while inactive or uncalibrated, inside the deadzone,
    /// for the first sample after calibration, and when the resulting delta
    /// is too small to matter.
    pub fn process_sample(&mut self, sample: &PoseSample) -> Option<ProcessedInput> {
        self.samples_received += 1;
        self.last_pose = Some(*sample);

        if !self.active {
            return None;
        }
        let Some(calibration) = self.calibration else {
            trace!("Pose ignored: tracking not calibrated");
            return None;
        };

        self.frames_processed += 1;

        let angles = sample.orientation.to_euler();
        let yaw = wrap_degrees((angles.yaw - calibration.yaw_offset).to_degrees());
        let pitch = wrap_degrees((angles.pitch - calibration.pitch_offset).to_degrees());

        let dt = self
            .previous_timestamp
            .map(|previous| sample.timestamp - previous);
        self.previous_timestamp = Some(sample.timestamp);

        let deadzone = self.settings.deadzone;
        if yaw.abs() < deadzone && pitch.abs() < deadzone {
            trace!("Pose inside deadzone ({:.2}°, {:.2}°)", yaw, pitch);
            return None;
        }

        let alpha = self.settings.smoothing;
        let previous_yaw = self.smoothed_yaw;
        let previous_pitch = self.smoothed_pitch;
        self.smoothed_yaw = previous_yaw * (1.0 - alpha) + yaw * alpha;
        self.smoothed_pitch = previous_pitch * (1.0 - alpha) + pitch * alpha;

        let dt = match dt {
            Some(dt) if dt > 0.0 => dt,
            Some(dt) => {
                debug!("Non-increasing pose timestamp (dt {:.4}s), sample skipped", dt);
                return None;
            }
            None => return None,
        };

        let max_delta = self.settings.max_speed * dt;
        let delta_yaw = (self.smoothed_yaw - previous_yaw).clamp(-max_delta, max_delta);
        let delta_pitch = (self.smoothed_pitch - previous_pitch).clamp(-max_delta, max_delta);

        let mut mouse_delta_x = delta_yaw * self.settings.sensitivity_x;
        let mut mouse_delta_y = delta_pitch * self.settings.sensitivity_y;
        if self.settings.invert_x {
            mouse_delta_x = -mouse_delta_x;
        }
        if self.settings.invert_y {
            mouse_delta_y = -mouse_delta_y;
        }

        if mouse_delta_x.abs() <= MIN_EMIT_DELTA && mouse_delta_y.abs() <= MIN_EMIT_DELTA {
            return None;
        }

        self.inputs_emitted += 1;
        Some(ProcessedInput {
            mouse_delta_x,
            mouse_delta_y,
            action: None,
            timestamp: sample.timestamp,
            source: InputSource::HeadTracking,
        })
    }

    pub fn stats(&self) -> TrackerStats {
        let uptime_secs = self
            .started_at
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or_default();
        let fps = if self.active && uptime_secs > 0.0 {
            self.frames_processed as f64 / uptime_secs
        } else {
            0.0
        };

        TrackerStats {
            state: self.state(),
            profile: self.profile_name.clone(),
            samples_received: self.samples_received,
            frames_processed: self.frames_processed,
            inputs_emitted: self.inputs_emitted,
            fps,
            uptime_secs,
        }
    }
}
