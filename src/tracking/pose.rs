use super::euler::Quaternion;
use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Head position in the headset's tracking space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One orientation/position reading from the headset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub orientation: Quaternion,
    pub position: Vector3,
    /// Seconds; only differences between samples matter
    pub timestamp: f64,
    /// Tracking confidence in [0, 1]
    pub confidence: f64,
}

impl PoseSample {
    pub fn new(orientation: Quaternion, position: Vector3, timestamp: f64) -> Self {
        Self {
            orientation,
            position,
            timestamp,
            confidence: 1.0,
        }
    }

    /// Parse a pose event received from the network
    ///
    /// Accepts both the nested form
    /// `{"pose": {"quaternion": [x,y,z,w], "position": [x,y,z]}, "timestamp": t}`
    /// and the flat form with `quaternion`/`position` at the top level.
    pub fn from_json(text: &str) -> Result<Self, TrackingError> {
        let event: PoseEvent = serde_json::from_str(text)
            .map_err(|e| TrackingError::invalid_pose(format!("malformed JSON: {}", e)))?;
        event.into_sample()
    }

    /// Parse an already decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, TrackingError> {
        let event: PoseEvent = serde_json::from_value(value)
            .map_err(|e| TrackingError::invalid_pose(format!("malformed event: {}", e)))?;
        event.into_sample()
    }
}

/// Wire shape of an inbound pose event
#[derive(Debug, Deserialize)]
struct PoseEvent {
    pose: Option<PoseBody>,
    #[serde(flatten)]
    flat: PoseBody,
    timestamp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PoseBody {
    quaternion: Option<Vec<f64>>,
    position: Option<Vec<f64>>,
    confidence: Option<f64>,
}

impl PoseEvent {
    fn into_sample(self) -> Result<PoseSample, TrackingError> {
        let body = match self.pose {
            Some(body) => body,
            None => self.flat,
        };

        let quaternion = body
            .quaternion
            .ok_or_else(|| TrackingError::invalid_pose("missing quaternion"))?;
        let [x, y, z, w] = <[f64; 4]>::try_from(quaternion.as_slice()).map_err(|_| {
            TrackingError::invalid_pose(format!(
                "quaternion needs 4 components, got {}",
                quaternion.len()
            ))
        })?;
        let orientation = Quaternion::new(x, y, z, w)
            .normalized()
            .ok_or_else(|| TrackingError::invalid_pose("quaternion is degenerate or non-finite"))?;

        let position = match body.position {
            Some(position) => {
                let [x, y, z] = <[f64; 3]>::try_from(position.as_slice()).map_err(|_| {
                    TrackingError::invalid_pose(format!(
                        "position needs 3 components, got {}",
                        position.len()
                    ))
                })?;
                if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                    return Err(TrackingError::invalid_pose("position is non-finite"));
                }
                Vector3::new(x, y, z)
            }
            None => Vector3::default(),
        };

        let timestamp = match self.timestamp {
            Some(timestamp) if timestamp.is_finite() => timestamp,
            Some(_) => return Err(TrackingError::invalid_pose("timestamp is non-finite")),
            None => now_secs(),
        };

        let confidence = match body.confidence {
            Some(confidence) if confidence.is_finite() => confidence.clamp(0.0, 1.0),
            Some(_) => return Err(TrackingError::invalid_pose("confidence is non-finite")),
            None => 1.0,
        };

        Ok(PoseSample {
            orientation,
            position,
            timestamp,
            confidence,
        })
    }
}

/// Current wall clock as fractional unix seconds
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_event() {
        let sample = PoseSample::from_json(
            r#"{"pose": {"quaternion": [0, 0, 0, 1], "position": [0.1, 1.6, -0.2]}, "timestamp": 12.5}"#,
        )
        .unwrap();

        assert_eq!(sample.orientation, Quaternion::IDENTITY);
        assert_eq!(sample.position, Vector3::new(0.1, 1.6, -0.2));
        assert_eq!(sample.timestamp, 12.5);
        assert_eq!(sample.confidence, 1.0);
    }

    #[test]
    fn test_flat_event_normalizes_quaternion() {
        let sample = PoseSample::from_json(
            r#"{"quaternion": [0, 0, 0, 2], "position": [0, 0, 0], "timestamp": 1.0, "confidence": 3.0}"#,
        )
        .unwrap();

        assert_eq!(sample.orientation.w, 1.0);
        assert_eq!(sample.confidence, 1.0);
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let err = PoseSample::from_json(r#"{"pose": {"quaternion": [0, 0, 1]}, "timestamp": 1}"#)
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidPose { .. }));

        let err = PoseSample::from_json(
            r#"{"pose": {"quaternion": [0, 0, 0, 1], "position": [1, 2]}, "timestamp": 1}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn test_degenerate_and_malformed_rejected() {
        assert!(PoseSample::from_json(r#"{"quaternion": [0, 0, 0, 0], "timestamp": 1}"#).is_err());
        assert!(PoseSample::from_json(r#"{"timestamp": 1}"#).is_err());
        assert!(PoseSample::from_json("not json").is_err());
        assert!(PoseSample::from_json(r#"{"quaternion": ["a", 0, 0, 1]}"#).is_err());
    }

    #[test]
    fn test_missing_timestamp_uses_wall_clock() {
        let before = now_secs();
        let sample =
            PoseSample::from_value(serde_json::json!({"quaternion": [0.0, 0.0, 0.0, 1.0]})).unwrap();
        assert!(sample.timestamp >= before);
    }
}
