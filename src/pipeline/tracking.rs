use super::{ComponentState, HeadcastPipeline, PoseOutcome};
use crate::error::{HeadcastError, InjectionError, Result};
use crate::events::HeadcastEvent;
use crate::injection::{InjectionOutcome, SurfaceKind};
use crate::profile::Profile;
use crate::tracking::{
    Calibration, GestureEvent, InputAction, InputSource, PoseSample, ProcessedInput,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

impl HeadcastPipeline {
    /// Start the input surface and accept poses
    pub async fn start_tracking(&self) -> Result<SurfaceKind> {
        let surface = match self.dispatcher.start() {
            Ok(surface) => surface,
            Err(e) => {
                self.set_component_state("tracking", ComponentState::Failed)
                    .await;
                return Err(e.into());
            }
        };

        self.tracking.lock().await.tracker.start_tracking();
        self.set_component_state("tracking", ComponentState::Running)
            .await;
        Ok(surface)
    }

    pub async fn stop_tracking(&self) {
        self.tracking.lock().await.tracker.stop_tracking();
        self.dispatcher.stop();
        self.set_component_state("tracking", ComponentState::Stopped)
            .await;
    }

    pub async fn is_tracking(&self) -> bool {
        self.tracking.lock().await.tracker.is_active()
    }

    /// Take the most recent pose as the new center
    pub async fn calibrate(&self) -> Result<Calibration> {
        let calibration = self.tracking.lock().await.tracker.calibrate()?;
        let _ = self.event_bus.publish(HeadcastEvent::TrackingCalibrated {
            yaw_offset: calibration.yaw_offset,
            pitch_offset: calibration.pitch_offset,
            timestamp: Utc::now(),
        });
        Ok(calibration)
    }

    /// Forget calibration and gesture history
    pub async fn reset_tracking(&self) {
        {
            let mut session = self.tracking.lock().await;
            session.tracker.reset_tracking();
            session.gestures.reset();
        }
        let _ = self.event_bus.publish(HeadcastEvent::TrackingReset {
            timestamp: Utc::now(),
        });
    }

    /// Parse a pose event and run it through tracking, gestures and injection
    ///
    /// Malformed events are rejected before any state changes. Injection
    /// failures are absorbed; the dispatcher logs and counts them.
    pub async fn handle_pose_event(&self, text: &str) -> Result<PoseOutcome> {
        let sample = PoseSample::from_json(text)?;
        Ok(self.handle_pose(sample).await)
    }

    /// Run an already parsed pose through tracking, gestures and injection
    pub async fn handle_pose(&self, sample: PoseSample) -> PoseOutcome {
        let (input, gesture) = {
            let mut session = self.tracking.lock().await;
            let input = session.tracker.process_sample(&sample);
            let gesture = if self.config.gesture.enabled && session.tracker.is_active() {
                session.gestures.push_sample(&sample)
            } else {
                None
            };
            (input, gesture)
        };

        let mut pending = Vec::new();
        if let Some(input) = &input {
            pending.push(input.clone());
        }
        if let Some(gesture) = &gesture {
            let _ = self.event_bus.publish(HeadcastEvent::GestureFired {
                gesture: gesture.kind,
                confidence: gesture.confidence,
                timestamp: Utc::now(),
            });
            if let Some(bound) = self.gesture_input(gesture) {
                pending.push(bound);
            }
        }

        let mut injected = Vec::new();
        for item in pending {
            match self.inject(item).await {
                Ok(outcome) => injected.push(outcome),
                Err(e) => debug!("Pose input not injected: {}", e),
            }
        }

        PoseOutcome {
            input,
            gesture,
            injected,
        }
    }

    /// Action bound to a gesture by the active profile
    fn gesture_input(&self, gesture: &GestureEvent) -> Option<ProcessedInput> {
        let profile = self.active_profile.read();
        let key = profile.gestures.get(gesture.kind.as_str())?;

        let action = match key.as_str() {
            "scroll_up" => InputAction::Scroll {
                amount: self.dispatcher.scroll_step(),
            },
            "scroll_down" => InputAction::Scroll {
                amount: -self.dispatcher.scroll_step(),
            },
            _ => InputAction::Press { key: key.clone() },
        };
        Some(ProcessedInput::action(
            action,
            gesture.timestamp,
            InputSource::Gesture,
        ))
    }

    /// Injection may sleep for key holds, so it runs off the async runtime
    async fn inject(
        &self,
        input: ProcessedInput,
    ) -> std::result::Result<InjectionOutcome, InjectionError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        task::spawn_blocking(move || dispatcher.inject(&input))
            .await
            .map_err(|e| InjectionError::failed(format!("injection task failed: {}", e)))?
    }

    /// Make `profile` the active snapshot for tracker and dispatcher
    pub async fn apply_profile(&self, profile: Profile) -> Result<()> {
        self.activate_profile(profile, None).await
    }

    /// Activate a configured profile by name
    pub async fn switch_profile(&self, name: &str) -> Result<()> {
        let profile = self
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| HeadcastError::system(format!("Unknown profile '{}'", name)))?;
        self.activate_profile(profile, None).await
    }

    /// Switch to the profile targeting a newly detected process
    ///
    /// Only profiles naming the process explicitly qualify; wildcard
    /// profiles never trigger a switch. Returns the activated profile name.
    pub async fn on_process_detected(&self, process_name: &str) -> Result<Option<String>> {
        if !self.config.tracking.auto_profile_switch {
            debug!("Automatic profile switching disabled, ignoring {}", process_name);
            return Ok(None);
        }

        let mut candidates: Vec<&Profile> = self
            .profiles
            .values()
            .filter(|profile| {
                profile
                    .process_patterns
                    .iter()
                    .any(|pattern| pattern != "*" && pattern.eq_ignore_ascii_case(process_name))
            })
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let Some(profile) = candidates.first().map(|profile| (*profile).clone()) else {
            debug!("No profile targets process {}", process_name);
            return Ok(None);
        };

        if self.active_profile.read().name == profile.name {
            return Ok(None);
        }

        let name = profile.name.clone();
        self.activate_profile(profile, Some(process_name.to_string()))
            .await?;
        Ok(Some(name))
    }

    async fn activate_profile(&self, profile: Profile, process: Option<String>) -> Result<()> {
        profile.validate().map_err(HeadcastError::system)?;

        self.tracking.lock().await.tracker.apply_profile(&profile);
        self.dispatcher.configure(&profile);
        let name = profile.name.clone();
        *self.active_profile.write() = profile;

        if let Some(process) = &process {
            info!("Profile '{}' activated for process {}", name, process);
        }
        let _ = self.event_bus.publish(HeadcastEvent::ProfileSwitched {
            profile: name,
            process,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
