mod euler;
mod gesture;
mod pose;
mod tracker;

pub use euler::{wrap_degrees, EulerAngles, Quaternion};
pub use gesture::{GestureEvent, GestureKind, GestureRecognizer, GestureStats};
pub use pose::{now_secs, PoseSample, Vector3};
pub use tracker::{
    Calibration, InputAction, InputSource, PoseTracker, ProcessedInput, TrackerState,
    TrackerStats, MIN_EMIT_DELTA,
};
