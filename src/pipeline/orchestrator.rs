use super::types::{ComponentState, ShutdownReason};
use crate::capture::{BackendFactory, CaptureEngine, CaptureEngineBuilder};
use crate::config::HeadcastConfig;
use crate::error::{HeadcastError, Result};
use crate::events::EventBus;
use crate::injection::{InjectionDispatcher, InjectionDispatcherBuilder, SurfaceFactory};
use crate::profile::Profile;
use crate::relay::FrameRelay;
use crate::streaming::{StreamBroadcaster, StreamBroadcasterBuilder};
use crate::tracking::{GestureRecognizer, PoseTracker};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pose-side state, locked as a unit so tracker and recognizer see the
/// same sample order
pub(super) struct TrackingSession {
    pub tracker: PoseTracker,
    pub gestures: GestureRecognizer,
}

/// Owns one instance of every component and wires them together
///
/// Shared as `Arc<HeadcastPipeline>`; every operation takes `&self`.
pub struct HeadcastPipeline {
    pub(super) config: HeadcastConfig,
    pub(super) event_bus: EventBus,
    pub(super) relay: Arc<FrameRelay>,

    // Components
    pub(super) capture: Arc<CaptureEngine>,
    pub(super) broadcaster: Arc<StreamBroadcaster>,
    pub(super) tracking: Mutex<TrackingSession>,
    pub(super) dispatcher: Arc<InjectionDispatcher>,

    // Profiles
    pub(super) profiles: HashMap<String, Profile>,
    pub(super) active_profile: parking_lot::RwLock<Profile>,

    // Lifecycle management
    pub(super) component_states: Mutex<BTreeMap<String, ComponentState>>,
    pub(super) shutdown_sender: parking_lot::Mutex<Option<oneshot::Sender<ShutdownReason>>>,
    pub(super) shutdown_receiver: parking_lot::Mutex<Option<oneshot::Receiver<ShutdownReason>>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) started_at: Instant,
}

impl HeadcastPipeline {
    /// Create a pipeline with platform-detected capture and input surfaces
    pub fn new(config: HeadcastConfig) -> Result<Self> {
        HeadcastPipelineBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &HeadcastConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn relay(&self) -> Arc<FrameRelay> {
        Arc::clone(&self.relay)
    }

    /// Snapshot of the profile currently in effect
    pub fn active_profile(&self) -> Profile {
        self.active_profile.read().clone()
    }

    /// Names of all configured profiles, sorted
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub(super) fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.config.system.stop_timeout_ms)
    }
}

/// Builder for the pipeline; surfaces can be swapped for tests and dry runs
pub struct HeadcastPipelineBuilder {
    config: Option<HeadcastConfig>,
    capture_backend: Option<BackendFactory>,
    input_surface: Option<SurfaceFactory>,
}

impl HeadcastPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            capture_backend: None,
            input_surface: None,
        }
    }

    pub fn config(mut self, config: HeadcastConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Capture from this backend instead of selecting one by configuration
    pub fn capture_backend(mut self, factory: BackendFactory) -> Self {
        self.capture_backend = Some(factory);
        self
    }

    /// Inject through this surface instead of detecting the platform one
    pub fn input_surface(mut self, factory: SurfaceFactory) -> Self {
        self.input_surface = Some(factory);
        self
    }

    pub fn build(self) -> Result<HeadcastPipeline> {
        let config = self
            .config
            .ok_or_else(|| HeadcastError::system("Pipeline configuration must be specified"))?;
        config.validate()?;

        let profile = config.active_profile().cloned().ok_or_else(|| {
            HeadcastError::system(format!(
                "Active profile '{}' is not defined",
                config.system.active_profile
            ))
        })?;

        let stop_timeout = Duration::from_millis(config.system.stop_timeout_ms);
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let relay = Arc::new(FrameRelay::new());

        let mut capture = CaptureEngineBuilder::new()
            .config(config.capture.clone())
            .relay(Arc::clone(&relay))
            .stop_timeout(stop_timeout);
        if let Some(factory) = self.capture_backend {
            capture = capture.backend(factory);
        }
        let capture = Arc::new(capture.build()?);

        let broadcaster = Arc::new(
            StreamBroadcasterBuilder::new()
                .config(config.stream.clone())
                .event_bus(event_bus.clone())
                .stop_timeout(stop_timeout)
                .build()?,
        );

        let mut dispatcher = InjectionDispatcherBuilder::new()
            .config(config.input.clone())
            .profile(profile.clone());
        if let Some(factory) = self.input_surface {
            dispatcher = dispatcher.surface(factory);
        }
        let dispatcher = Arc::new(dispatcher.build()?);

        let tracking = TrackingSession {
            tracker: PoseTracker::new(&profile),
            gestures: GestureRecognizer::new(
                config.gesture.history_size,
                config.gesture.min_confidence,
                config.gesture.cooldown_ms as f64 / 1000.0,
            ),
        };

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!(
            "Pipeline created with profile '{}' ({} profiles available)",
            profile.name,
            config.profiles.len()
        );

        Ok(HeadcastPipeline {
            profiles: config.profiles.clone(),
            event_bus,
            relay,
            capture,
            broadcaster,
            tracking: Mutex::new(tracking),
            dispatcher,
            active_profile: parking_lot::RwLock::new(profile),
            component_states: Mutex::new(BTreeMap::new()),
            shutdown_sender: parking_lot::Mutex::new(Some(shutdown_sender)),
            shutdown_receiver: parking_lot::Mutex::new(Some(shutdown_receiver)),
            cancellation_token: CancellationToken::new(),
            started_at: Instant::now(),
            config,
        })
    }
}

impl Default for HeadcastPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
