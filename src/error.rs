use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeadcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Injection error: {0}")]
    Injection(#[from] InjectionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl HeadcastError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Screen capture failures
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No backend could be initialized
    #[error("No capture backend available: {details}")]
    Unavailable { details: String },

    /// A single capture cycle failed
    #[error("Frame capture failed: {details}")]
    FrameFailed { details: String },

    #[error("Frame capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid frame geometry: {details}")]
    InvalidGeometry { details: String },
}

impl CaptureError {
    pub fn frame_failed<S: Into<String>>(details: S) -> Self {
        Self::FrameFailed {
            details: details.into(),
        }
    }
}

/// Encoding and broadcast failures
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Frame encoding failed: {details}")]
    EncodeFailed { details: String },

    #[error("Send to session {session_id} failed: {details}")]
    SessionSendFailed { session_id: String, details: String },

    #[error("Stream startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Invalid control message: {details}")]
    InvalidControlMessage { details: String },
}

/// Why a frame could not be handed to one viewer session
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSendError {
    /// Transport is gone; the session is removed
    #[error("session closed")]
    Closed,

    /// Transport buffer is full; this frame is dropped for the session
    #[error("session buffer full")]
    Full,
}

/// Pose processing failures
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Tracking is not calibrated")]
    NotCalibrated,

    #[error("Invalid pose event: {details}")]
    InvalidPose { details: String },
}

impl TrackingError {
    pub fn invalid_pose<S: Into<String>>(details: S) -> Self {
        Self::InvalidPose {
            details: details.into(),
        }
    }
}

/// Input injection failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InjectionError {
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Input injection failed: {details}")]
    Failed { details: String },

    #[error("No input injection surface available")]
    Unavailable,
}

impl InjectionError {
    pub fn failed<S: Into<String>>(details: S) -> Self {
        Self::Failed {
            details: details.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, HeadcastError>;
