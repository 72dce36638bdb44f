use super::pose::PoseSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// History required before any detector runs
const MIN_HISTORY: usize = 5;
/// Below this peak per-sample change a nod or shake is treated as noise
const MIN_SWING_RADIANS: f64 = 0.5 * PI / 180.0;
/// Circles smaller than this radius are treated as jitter
const MIN_CIRCLE_RADIUS: f64 = 2.0 * PI / 180.0;
/// Angle changes around the centroid smaller than this are ignored
const MIN_ANGLE_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Nod,
    Shake,
    TiltLeft,
    TiltRight,
    Forward,
    Backward,
    CircleCw,
    CircleCcw,
}

impl GestureKind {
    /// Detection priority; the first qualifying kind wins a cycle
    pub const ALL: [GestureKind; 8] = [
        GestureKind::Nod,
        GestureKind::Shake,
        GestureKind::TiltLeft,
        GestureKind::TiltRight,
        GestureKind::Forward,
        GestureKind::Backward,
        GestureKind::CircleCw,
        GestureKind::CircleCcw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureKind::Nod => "nod",
            GestureKind::Shake => "shake",
            GestureKind::TiltLeft => "tilt_left",
            GestureKind::TiltRight => "tilt_right",
            GestureKind::Forward => "forward",
            GestureKind::Backward => "backward",
            GestureKind::CircleCw => "circle_cw",
            GestureKind::CircleCcw => "circle_ccw",
        }
    }

    /// Samples a detector needs before it can score
    pub fn min_samples(&self) -> usize {
        match self {
            GestureKind::Nod | GestureKind::Shake => 8,
            GestureKind::TiltLeft
            | GestureKind::TiltRight
            | GestureKind::Forward
            | GestureKind::Backward => 5,
            GestureKind::CircleCw | GestureKind::CircleCcw => 15,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GestureKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown gesture '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub confidence: f64,
    pub timestamp: f64,
}

/// Pose reduced to what the detectors look at
#[derive(Debug, Clone, Copy)]
struct GestureSample {
    yaw: f64,
    pitch: f64,
    roll: f64,
    z: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GestureStats {
    pub history_size: usize,
    pub min_confidence: f64,
    pub cooldown_secs: f64,
    pub total_fired: u64,
    pub fired_by_kind: Vec<(GestureKind, u64)>,
    pub last_gesture: Option<GestureKind>,
}

/// Detects discrete head gestures from a rolling pose history
///
/// Observers subscribe to a broadcast channel instead of registering
/// callbacks; a fired gesture never calls back into the recognizer.
pub struct GestureRecognizer {
    history: VecDeque<GestureSample>,
    capacity: usize,
    min_confidence: f64,
    cooldown_secs: f64,
    last_fired_at: Option<f64>,
    last_gesture: Option<GestureKind>,
    fired_counts: [u64; 8],
    sender: broadcast::Sender<GestureEvent>,
}

impl GestureRecognizer {
    pub fn new(capacity: usize, min_confidence: f64, cooldown_secs: f64) -> Self {
        let (sender, _) = broadcast::channel(32);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(GestureKind::CircleCw.min_samples()),
            min_confidence: min_confidence.clamp(0.1, 1.0),
            cooldown_secs,
            last_fired_at: None,
            last_gesture: None,
            fired_counts: [0; 8],
            sender,
        }
    }

    /// Receive every gesture fired from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GestureEvent> {
        self.sender.subscribe()
    }

    pub fn set_min_confidence(&mut self, confidence: f64) {
        self.min_confidence = confidence.clamp(0.1, 1.0);
        debug!("Gesture minimum confidence set to {:.2}", self.min_confidence);
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Append a pose and run one detection cycle
    pub fn push_sample(&mut self, sample: &PoseSample) -> Option<GestureEvent> {
        let angles = sample.orientation.to_euler();
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(GestureSample {
            yaw: angles.yaw,
            pitch: angles.pitch,
            roll: angles.roll,
            z: sample.position.z,
        });

        self.detect(sample.timestamp)
    }

    /// Run one detection cycle at time `now` (pose clock, seconds)
    pub fn detect(&mut self, now: f64) -> Option<GestureEvent> {
        if self.history.len() < MIN_HISTORY {
            return None;
        }
        if let Some(last) = self.last_fired_at {
            if now - last < self.cooldown_secs {
                return None;
            }
        }

        let (kind, confidence) = GestureKind::ALL
            .iter()
            .map(|kind| (*kind, self.score(*kind)))
            .find(|(_, confidence)| *confidence >= self.min_confidence)?;

        let event = GestureEvent {
            kind,
            confidence,
            timestamp: now,
        };

        self.last_fired_at = Some(now);
        self.last_gesture = Some(kind);
        self.fired_counts[kind.index()] += 1;
        info!("Gesture detected: {} (confidence {:.2})", kind, confidence);

        // No subscribers is fine
        let _ = self.sender.send(event);
        Some(event)
    }

    /// Confidence in [0, 1] that the current history shows `kind`
    pub fn score(&self, kind: GestureKind) -> f64 {
        let needed = kind.min_samples();
        if self.history.len() < needed {
            return 0.0;
        }
        let recent: Vec<GestureSample> = self
            .history
            .iter()
            .skip(self.history.len() - needed)
            .copied()
            .collect();

        match kind {
            GestureKind::Nod => {
                let pitches: Vec<f64> = recent.iter().map(|s| s.pitch).collect();
                (movement_pattern_score(&pitches, [1.0, -1.0, 1.0]) * 1.5).min(1.0)
            }
            GestureKind::Shake => {
                let yaws: Vec<f64> = recent.iter().map(|s| s.yaw).collect();
                (movement_pattern_score(&yaws, [-1.0, 1.0, -1.0]) * 1.5).min(1.0)
            }
            GestureKind::TiltLeft | GestureKind::TiltRight => {
                let average_roll =
                    recent.iter().map(|s| s.roll).sum::<f64>() / recent.len() as f64;
                let directed = if kind == GestureKind::TiltLeft {
                    -average_roll
                } else {
                    average_roll
                };
                (directed * 2.0).clamp(0.0, 1.0)
            }
            GestureKind::Forward | GestureKind::Backward => {
                let change = recent[recent.len() - 1].z - recent[0].z;
                let directed = if kind == GestureKind::Forward {
                    change
                } else {
                    -change
                };
                (directed * 3.0).clamp(0.0, 1.0)
            }
            GestureKind::CircleCw | GestureKind::CircleCcw => {
                let points: Vec<(f64, f64)> = recent.iter().map(|s| (s.yaw, s.pitch)).collect();
                circle_score(&points, kind == GestureKind::CircleCw).min(1.0)
            }
        }
    }

    /// Drop the history and cooldown, keep the counters
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_fired_at = None;
        debug!("Gesture history cleared");
    }

    pub fn stats(&self) -> GestureStats {
        GestureStats {
            history_size: self.history.len(),
            min_confidence: self.min_confidence,
            cooldown_secs: self.cooldown_secs,
            total_fired: self.fired_counts.iter().sum(),
            fired_by_kind: GestureKind::ALL
                .iter()
                .map(|kind| (*kind, self.fired_counts[kind.index()]))
                .collect(),
            last_gesture: self.last_gesture,
        }
    }
}

/// Match the sign of successive derivative segments against `pattern`
///
/// Derivatives are split into three runs; a run matches when its mean points
/// the expected way with at least a quarter of the peak change.
fn movement_pattern_score(values: &[f64], pattern: [f64; 3]) -> f64 {
    let derivatives: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    if derivatives.len() < pattern.len() {
        return 0.0;
    }

    let peak = derivatives.iter().fold(0.0f64, |acc, d| acc.max(d.abs()));
    if peak < MIN_SWING_RADIANS {
        return 0.0;
    }

    let segments = pattern.len();
    let matches = (0..segments)
        .filter(|&i| {
            let start = i * derivatives.len() / segments;
            let end = (i + 1) * derivatives.len() / segments;
            let segment = &derivatives[start..end];
            let mean = segment.iter().sum::<f64>() / segment.len() as f64;
            mean.signum() == pattern[i] && mean.abs() >= peak * 0.25
        })
        .count();

    matches as f64 / segments as f64
}

/// Roundness of the path plus agreement of its turning direction
fn circle_score(points: &[(f64, f64)], clockwise: bool) -> f64 {
    let n = points.len() as f64;
    let center_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let center_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let distances: Vec<f64> = points
        .iter()
        .map(|(x, y)| ((x - center_x).powi(2) + (y - center_y).powi(2)).sqrt())
        .collect();
    let mean_distance = distances.iter().sum::<f64>() / n;
    if mean_distance < MIN_CIRCLE_RADIUS {
        return 0.0;
    }
    let variance = distances
        .iter()
        .map(|d| (d - mean_distance).powi(2))
        .sum::<f64>()
        / n;
    // Relative spread, so the score does not depend on the circle's size
    let circularity = (1.0 - variance.sqrt() / mean_distance).clamp(0.0, 1.0);

    let angles: Vec<f64> = points
        .iter()
        .map(|(x, y)| (y - center_y).atan2(x - center_x))
        .collect();

    let mut significant = 0usize;
    let mut agreeing = 0usize;
    for pair in angles.windows(2) {
        let diff = normalize_angle(pair[1] - pair[0]);
        if diff.abs() > MIN_ANGLE_STEP {
            significant += 1;
            if (clockwise && diff < 0.0) || (!clockwise && diff > 0.0) {
                agreeing += 1;
            }
        }
    }
    let direction = if significant > 0 {
        agreeing as f64 / significant as f64
    } else {
        0.0
    };

    (circularity + direction) / 2.0
}

fn normalize_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}
