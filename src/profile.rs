use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Head tracking tuning carried by a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadTrackingSettings {
    #[serde(default = "default_sensitivity")]
    pub sensitivity_x: f64,

    #[serde(default = "default_sensitivity")]
    pub sensitivity_y: f64,

    /// Angular band around the calibrated center, in degrees
    #[serde(default = "default_deadzone")]
    pub deadzone: f64,

    /// EMA weight applied to new readings
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,

    /// Maximum angular speed in degrees per second
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,

    #[serde(default)]
    pub invert_x: bool,

    #[serde(default)]
    pub invert_y: bool,
}

/// Mouse injection tuning carried by a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default = "default_sensitivity")]
    pub mouse_sensitivity: f64,

    /// Exponent applied to delta magnitude; 1.0 disables acceleration
    #[serde(default = "default_acceleration_curve")]
    pub acceleration_curve: f64,

    /// Deltas below this on both axes are not injected
    #[serde(default = "default_min_mouse_delta")]
    pub min_mouse_delta: f64,
}

/// Named bundle of tracking and injection parameters
///
/// Profiles are applied as immutable snapshots: components clone the whole
/// value on activation and never observe a partially updated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default = "default_profile_name")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Process names this profile targets
    #[serde(default = "default_process_patterns")]
    pub process_patterns: Vec<String>,

    #[serde(default)]
    pub head_tracking: HeadTrackingSettings,

    #[serde(default)]
    pub input: InputSettings,

    /// Gesture name to key or mouse button name
    #[serde(default)]
    pub gestures: BTreeMap<String, String>,
}

impl Profile {
    /// Check that every tuning value is in range
    pub fn validate(&self) -> Result<(), String> {
        let tracking = &self.head_tracking;
        if tracking.sensitivity_x <= 0.0 || tracking.sensitivity_y <= 0.0 {
            return Err(format!("Profile '{}': sensitivity must be greater than 0", self.name));
        }
        if tracking.deadzone < 0.0 {
            return Err(format!("Profile '{}': deadzone must not be negative", self.name));
        }
        if !(tracking.smoothing > 0.0 && tracking.smoothing <= 1.0) {
            return Err(format!("Profile '{}': smoothing must be within (0, 1]", self.name));
        }
        if tracking.max_speed <= 0.0 {
            return Err(format!("Profile '{}': max_speed must be greater than 0", self.name));
        }

        let input = &self.input;
        if input.mouse_sensitivity <= 0.0 {
            return Err(format!("Profile '{}': mouse_sensitivity must be greater than 0", self.name));
        }
        if input.acceleration_curve <= 0.0 {
            return Err(format!("Profile '{}': acceleration_curve must be greater than 0", self.name));
        }
        if input.min_mouse_delta < 0.0 {
            return Err(format!("Profile '{}': min_mouse_delta must not be negative", self.name));
        }

        Ok(())
    }

    /// Whether a process name matches one of the profile's patterns
    ///
    /// Patterns are exact, case-insensitive names; `*` matches anything.
    pub fn matches_process(&self, process_name: &str) -> bool {
        self.process_patterns
            .iter()
            .any(|pattern| pattern == "*" || pattern.eq_ignore_ascii_case(process_name))
    }
}

impl Default for HeadTrackingSettings {
    fn default() -> Self {
        Self {
            sensitivity_x: default_sensitivity(),
            sensitivity_y: default_sensitivity(),
            deadzone: default_deadzone(),
            smoothing: default_smoothing(),
            max_speed: default_max_speed(),
            invert_x: false,
            invert_y: false,
        }
    }
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            mouse_sensitivity: default_sensitivity(),
            acceleration_curve: default_acceleration_curve(),
            min_mouse_delta: default_min_mouse_delta(),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            description: "Standard profile for all applications".to_string(),
            process_patterns: default_process_patterns(),
            head_tracking: HeadTrackingSettings::default(),
            input: InputSettings::default(),
            gestures: BTreeMap::new(),
        }
    }
}

/// Profiles shipped with the binary, keyed by name
pub fn builtin_profiles() -> HashMap<String, Profile> {
    let mut profiles = HashMap::new();

    profiles.insert("default".to_string(), Profile::default());

    profiles.insert(
        "shooter".to_string(),
        Profile {
            name: "shooter".to_string(),
            description: "Fast aiming with gesture shortcuts".to_string(),
            process_patterns: Vec::new(),
            head_tracking: HeadTrackingSettings {
                sensitivity_x: 1.2,
                max_speed: 200.0,
                ..HeadTrackingSettings::default()
            },
            input: InputSettings {
                mouse_sensitivity: 1.2,
                acceleration_curve: 1.3,
                min_mouse_delta: 0.3,
            },
            gestures: BTreeMap::from([
                ("nod".to_string(), "lmb".to_string()),
                ("shake".to_string(), "r".to_string()),
                ("tilt_left".to_string(), "tab".to_string()),
            ]),
        },
    );

    profiles.insert(
        "racing".to_string(),
        Profile {
            name: "racing".to_string(),
            description: "Slow, heavily smoothed look-around".to_string(),
            process_patterns: Vec::new(),
            head_tracking: HeadTrackingSettings {
                sensitivity_x: 0.6,
                sensitivity_y: 0.4,
                deadzone: 1.5,
                smoothing: 0.3,
                max_speed: 90.0,
                ..HeadTrackingSettings::default()
            },
            input: InputSettings {
                mouse_sensitivity: 0.6,
                acceleration_curve: 0.8,
                min_mouse_delta: 0.8,
            },
            gestures: BTreeMap::new(),
        },
    );

    profiles.insert(
        "flight".to_string(),
        Profile {
            name: "flight".to_string(),
            description: "Precise cockpit view".to_string(),
            process_patterns: Vec::new(),
            head_tracking: HeadTrackingSettings {
                sensitivity_x: 0.5,
                sensitivity_y: 0.5,
                deadzone: 0.5,
                smoothing: 0.1,
                max_speed: 60.0,
                ..HeadTrackingSettings::default()
            },
            input: InputSettings {
                mouse_sensitivity: 0.5,
                acceleration_curve: 0.9,
                min_mouse_delta: 0.2,
            },
            gestures: BTreeMap::new(),
        },
    );

    profiles
}

fn default_profile_name() -> String {
    "default".to_string()
}
fn default_process_patterns() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_sensitivity() -> f64 {
    1.0
}
fn default_deadzone() -> f64 {
    0.8
}
fn default_smoothing() -> f64 {
    0.15
}
fn default_max_speed() -> f64 {
    180.0
}
fn default_acceleration_curve() -> f64 {
    1.0
}
fn default_min_mouse_delta() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_validate() {
        let profiles = builtin_profiles();
        assert!(profiles.contains_key("default"));

        for (name, profile) in &profiles {
            assert_eq!(name, &profile.name);
            assert!(profile.validate().is_ok(), "profile {} invalid", name);
        }
    }

    #[test]
    fn test_default_profile_values() {
        let profile = Profile::default();
        let tracking = &profile.head_tracking;

        assert_eq!(tracking.sensitivity_x, 1.0);
        assert_eq!(tracking.deadzone, 0.8);
        assert_eq!(tracking.smoothing, 0.15);
        assert_eq!(tracking.max_speed, 180.0);
        assert!(!tracking.invert_x && !tracking.invert_y);
        assert_eq!(profile.input.min_mouse_delta, 0.5);
    }

    #[test]
    fn test_profile_validation_rejects_bad_values() {
        let mut profile = Profile::default();
        profile.head_tracking.smoothing = 0.0;
        assert!(profile.validate().is_err());

        let mut profile = Profile::default();
        profile.input.acceleration_curve = -1.0;
        assert!(profile.validate().is_err());

        let mut profile = Profile::default();
        profile.head_tracking.max_speed = 0.0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_partial_profile_deserializes_with_defaults() {
        let profile: Profile = toml::from_str(
            r#"
            name = "custom"
            [head_tracking]
            deadzone = 2.0
            [gestures]
            nod = "space"
            "#,
        )
        .unwrap();

        assert_eq!(profile.name, "custom");
        assert_eq!(profile.head_tracking.deadzone, 2.0);
        assert_eq!(profile.head_tracking.smoothing, 0.15);
        assert_eq!(profile.input.mouse_sensitivity, 1.0);
        assert_eq!(profile.gestures.get("nod").map(String::as_str), Some("space"));
    }

    #[test]
    fn test_process_matching() {
        let mut profile = Profile::default();
        assert!(profile.matches_process("anything.exe"));

        profile.process_patterns = vec!["Game.exe".to_string()];
        assert!(profile.matches_process("game.exe"));
        assert!(!profile.matches_process("other.exe"));
    }
}
