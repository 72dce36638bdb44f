pub mod capture;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod frame;
pub mod injection;
pub mod pipeline;
#[cfg(target_os = "linux")]
mod process;
pub mod profile;
pub mod relay;
pub mod streaming;
pub mod tracking;

pub use capture::{CaptureBackend, CaptureEngine, CaptureEngineBuilder, CaptureMethod, CaptureStats};
pub use config::HeadcastConfig;
pub use console::{ConsoleCommand, OperatorConsole};
pub use error::{HeadcastError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, HeadcastEvent};
pub use frame::{Frame, PixelLayout, RawFrame};
pub use injection::{
    InjectionDispatcher, InjectionDispatcherBuilder, InjectionStats, InputSurface,
    KeyboardLayout, MockInputSurface, MouseButton, SurfaceKind,
};
pub use pipeline::{
    ComponentState, HeadcastPipeline, HeadcastPipelineBuilder, PipelineStats, PoseOutcome,
    ShutdownReason,
};
pub use profile::{HeadTrackingSettings, InputSettings, Profile};
pub use relay::{FrameRelay, RelayStatsSnapshot};
pub use streaming::{
    ChannelSession, ControlMessage, ControlReply, EncodedFrame, StreamBroadcaster,
    StreamBroadcasterBuilder, StreamStats, ViewerSession,
};
pub use tracking::{
    GestureEvent, GestureKind, GestureRecognizer, PoseSample, PoseTracker, ProcessedInput,
    TrackerState,
};
