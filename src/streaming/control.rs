use crate::error::StreamError;
use crate::tracking::now_secs;
use serde::{Deserialize, Serialize};

/// Runtime adjustments requested by a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    QualityChange {
        #[serde(default = "default_quality")]
        quality: i64,
    },
    ResolutionChange {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<f64>,
    },
}

/// Answers sent back to the viewer that asked
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    Pong {
        timestamp: Option<f64>,
        server_timestamp: f64,
    },
    QualityChanged {
        quality: u8,
    },
    ResolutionChanged {
        width: u32,
        height: u32,
    },
}

impl ControlMessage {
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        serde_json::from_str(text).map_err(|e| StreamError::InvalidControlMessage {
            details: e.to_string(),
        })
    }
}

impl ControlReply {
    pub fn pong(timestamp: Option<f64>) -> Self {
        ControlReply::Pong {
            timestamp,
            server_timestamp: now_secs(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn default_quality() -> i64 {
    85
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
