use crate::profile::{builtin_profiles, Profile};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HeadcastConfig {
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub tracking: TrackingConfig,
    pub gesture: GestureConfig,
    pub input: InputConfig,
    pub system: SystemConfig,

    /// Named profiles; builtin profiles are added when missing
    #[serde(default = "builtin_profiles")]
    pub profiles: HashMap<String, Profile>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Normalized frame width in pixels
    #[serde(default = "default_capture_width")]
    pub width: u32,

    /// Normalized frame height in pixels
    #[serde(default = "default_capture_height")]
    pub height: u32,

    /// Target capture rate
    #[serde(default = "default_capture_fps")]
    pub fps: u32,

    /// Monitor to capture (0 = primary)
    #[serde(default)]
    pub monitor: u32,

    /// Backend to use: auto, dxgi, screenshot_tool, screen_grab or test_pattern
    #[serde(default = "default_capture_backend")]
    pub backend: String,

    /// Per-cycle capture budget in milliseconds
    #[serde(default = "default_capture_timeout_ms")]
    pub operation_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_width")]
    pub width: u32,

    #[serde(default = "default_stream_height")]
    pub height: u32,

    /// Target broadcast rate, independent of the capture rate
    #[serde(default = "default_stream_fps")]
    pub fps: u32,

    /// JPEG quality (10-100)
    #[serde(default = "default_stream_quality")]
    pub quality: u8,

    /// Sleep between cycles while no viewer is connected
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,

    /// Per-cycle encode budget in milliseconds
    #[serde(default = "default_encode_timeout_ms")]
    pub encode_timeout_ms: u64,

    /// Consecutive dropped sends tolerated before a session is removed
    #[serde(default = "default_max_send_failures")]
    pub max_send_failures: u32,

    /// Frames buffered per channel-backed session
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackingConfig {
    /// Start head tracking together with the pipeline
    #[serde(default = "default_tracking_auto_start")]
    pub auto_start: bool,

    /// Switch profiles when a matching foreground process is reported
    #[serde(default = "default_auto_profile_switch")]
    pub auto_profile_switch: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GestureConfig {
    #[serde(default = "default_gesture_enabled")]
    pub enabled: bool,

    /// Minimum confidence for a gesture to fire
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Global cooldown between fired gestures
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Pose samples kept for detection
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InputConfig {
    /// Keyboard layout: en, de, fr or es
    #[serde(default = "default_keyboard_layout")]
    pub keyboard_layout: String,

    /// Hold time for press-and-release actions
    #[serde(default = "default_key_hold_ms")]
    pub key_hold_ms: u64,

    /// Scroll units sent for a scroll action
    #[serde(default = "default_scroll_step")]
    pub scroll_step: i32,

    /// Deadline for one call into an external input tool
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Profile activated at startup
    #[serde(default = "default_active_profile")]
    pub active_profile: String,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Period of performance update notifications
    #[serde(default = "default_stats_interval_seconds")]
    pub stats_interval_seconds: u64,

    /// Bound on joining a worker thread during stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl HeadcastConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("headcast.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables use the `HEADCAST_` prefix and a double
    /// underscore between section and key, e.g. `HEADCAST_STREAM__QUALITY=70`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("capture.width", default_capture_width())?
            .set_default("capture.height", default_capture_height())?
            .set_default("capture.fps", default_capture_fps())?
            .set_default("capture.monitor", 0)?
            .set_default("capture.backend", default_capture_backend())?
            .set_default("capture.operation_timeout_ms", default_capture_timeout_ms())?
            .set_default("stream.width", default_stream_width())?
            .set_default("stream.height", default_stream_height())?
            .set_default("stream.fps", default_stream_fps())?
            .set_default("stream.quality", default_stream_quality() as u32)?
            .set_default("stream.idle_sleep_ms", default_idle_sleep_ms())?
            .set_default("stream.encode_timeout_ms", default_encode_timeout_ms())?
            .set_default("stream.max_send_failures", default_max_send_failures())?
            .set_default("stream.session_buffer", default_session_buffer() as u64)?
            .set_default("tracking.auto_start", default_tracking_auto_start())?
            .set_default(
                "tracking.auto_profile_switch",
                default_auto_profile_switch(),
            )?
            .set_default("gesture.enabled", default_gesture_enabled())?
            .set_default("gesture.min_confidence", default_min_confidence())?
            .set_default("gesture.cooldown_ms", default_cooldown_ms())?
            .set_default("gesture.history_size", default_history_size() as u64)?
            .set_default("input.keyboard_layout", default_keyboard_layout())?
            .set_default("input.key_hold_ms", default_key_hold_ms())?
            .set_default("input.scroll_step", default_scroll_step())?
            .set_default("input.command_timeout_ms", default_command_timeout_ms())?
            .set_default("system.active_profile", default_active_profile())?
            .set_default("system.event_bus_capacity", default_event_bus_capacity() as u64)?
            .set_default(
                "system.stats_interval_seconds",
                default_stats_interval_seconds(),
            )?
            .set_default("system.stop_timeout_ms", default_stop_timeout_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with HEADCAST_ prefix
            .add_source(
                Environment::with_prefix("HEADCAST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: HeadcastConfig = settings.try_deserialize()?;

        for (name, profile) in builtin_profiles() {
            config.profiles.entry(name).or_insert(profile);
        }
        for (name, profile) in config.profiles.iter_mut() {
            if profile.name != *name {
                profile.name = name.clone();
            }
        }

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Message(
                "Capture resolution must be greater than 0".to_string(),
            ));
        }

        if self.capture.fps == 0 || self.capture.fps > 240 {
            return Err(ConfigError::Message(
                "Capture fps must be between 1 and 240".to_string(),
            ));
        }

        if !matches!(
            self.capture.backend.as_str(),
            "auto" | "dxgi" | "screenshot_tool" | "screen_grab" | "test_pattern"
        ) {
            return Err(ConfigError::Message(format!(
                "Unknown capture backend '{}'",
                self.capture.backend
            )));
        }

        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(ConfigError::Message(
                "Stream resolution must be greater than 0".to_string(),
            ));
        }

        if self.stream.fps == 0 || self.stream.fps > 240 {
            return Err(ConfigError::Message(
                "Stream fps must be between 1 and 240".to_string(),
            ));
        }

        if !(10..=100).contains(&self.stream.quality) {
            return Err(ConfigError::Message(
                "Stream quality must be between 10 and 100".to_string(),
            ));
        }

        if self.stream.session_buffer == 0 {
            return Err(ConfigError::Message(
                "Session buffer must be greater than 0".to_string(),
            ));
        }

        if !(0.1..=1.0).contains(&self.gesture.min_confidence) {
            return Err(ConfigError::Message(
                "Gesture min_confidence must be between 0.1 and 1.0".to_string(),
            ));
        }

        if self.gesture.history_size < 15 {
            return Err(ConfigError::Message(
                "Gesture history_size must hold at least 15 samples".to_string(),
            ));
        }

        if !matches!(self.input.keyboard_layout.as_str(), "en" | "de" | "fr" | "es") {
            return Err(ConfigError::Message(format!(
                "Unsupported keyboard layout '{}'",
                self.input.keyboard_layout
            )));
        }

        if self.input.command_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Input command_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if !self.profiles.contains_key(&self.system.active_profile) {
            return Err(ConfigError::Message(format!(
                "Active profile '{}' is not defined",
                self.system.active_profile
            )));
        }

        for profile in self.profiles.values() {
            profile.validate().map_err(ConfigError::Message)?;
        }

        Ok(())
    }

    /// Look up the profile activated at startup
    pub fn active_profile(&self) -> Option<&Profile> {
        self.profiles.get(&self.system.active_profile)
    }

    /// Serialize the configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for HeadcastConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                width: default_capture_width(),
                height: default_capture_height(),
                fps: default_capture_fps(),
                monitor: 0,
                backend: default_capture_backend(),
                operation_timeout_ms: default_capture_timeout_ms(),
            },
            stream: StreamConfig {
                width: default_stream_width(),
                height: default_stream_height(),
                fps: default_stream_fps(),
                quality: default_stream_quality(),
                idle_sleep_ms: default_idle_sleep_ms(),
                encode_timeout_ms: default_encode_timeout_ms(),
                max_send_failures: default_max_send_failures(),
                session_buffer: default_session_buffer(),
            },
            tracking: TrackingConfig {
                auto_start: default_tracking_auto_start(),
                auto_profile_switch: default_auto_profile_switch(),
            },
            gesture: GestureConfig {
                enabled: default_gesture_enabled(),
                min_confidence: default_min_confidence(),
                cooldown_ms: default_cooldown_ms(),
                history_size: default_history_size(),
            },
            input: InputConfig {
                keyboard_layout: default_keyboard_layout(),
                key_hold_ms: default_key_hold_ms(),
                scroll_step: default_scroll_step(),
                command_timeout_ms: default_command_timeout_ms(),
            },
            system: SystemConfig {
                active_profile: default_active_profile(),
                event_bus_capacity: default_event_bus_capacity(),
                stats_interval_seconds: default_stats_interval_seconds(),
                stop_timeout_ms: default_stop_timeout_ms(),
            },
            profiles: builtin_profiles(),
        }
    }
}

// Default value functions
fn default_capture_width() -> u32 {
    1920
}
fn default_capture_height() -> u32 {
    1080
}
fn default_capture_fps() -> u32 {
    60
}
fn default_capture_backend() -> String {
    "auto".to_string()
}
fn default_capture_timeout_ms() -> u64 {
    250
}

fn default_stream_width() -> u32 {
    1920
}
fn default_stream_height() -> u32 {
    1080
}
fn default_stream_fps() -> u32 {
    60
}
fn default_stream_quality() -> u8 {
    85
}
fn default_idle_sleep_ms() -> u64 {
    100
}
fn default_encode_timeout_ms() -> u64 {
    100
}
fn default_max_send_failures() -> u32 {
    30
}
fn default_session_buffer() -> usize {
    2
}

fn default_tracking_auto_start() -> bool {
    true
}
fn default_auto_profile_switch() -> bool {
    true
}

fn default_gesture_enabled() -> bool {
    true
}
fn default_min_confidence() -> f64 {
    0.7
}
fn default_cooldown_ms() -> u64 {
    500
}
fn default_history_size() -> usize {
    30
}

fn default_keyboard_layout() -> String {
    "en".to_string()
}
fn default_key_hold_ms() -> u64 {
    100
}
fn default_scroll_step() -> i32 {
    3
}
fn default_command_timeout_ms() -> u64 {
    500
}

fn default_active_profile() -> String {
    "default".to_string()
}
fn default_event_bus_capacity() -> usize {
    100
}
fn default_stats_interval_seconds() -> u64 {
    5
}
fn default_stop_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = HeadcastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.quality, 85);
        assert_eq!(config.capture.fps, 60);
        assert_eq!(config.active_profile().unwrap().name, "default");
    }

    #[test]
    fn test_config_validation() {
        let mut config = HeadcastConfig::default();
        config.capture.width = 0;
        assert!(config.validate().is_err());
        config.capture.width = 1280;
        assert!(config.validate().is_ok());

        config.stream.quality = 5;
        assert!(config.validate().is_err());
        config.stream.quality = 70;

        config.capture.backend = "vnc".to_string();
        assert!(config.validate().is_err());
        config.capture.backend = "test_pattern".to_string();

        config.system.active_profile = "missing".to_string();
        assert!(config.validate().is_err());
        config.system.active_profile = "racing".to_string();

        config.input.keyboard_layout = "jp".to_string();
        assert!(config.validate().is_err());
        config.input.keyboard_layout = "de".to_string();

        config.input.command_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.input.command_timeout_ms = 250;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
width = 1280
height = 720
backend = "test_pattern"

[stream]
quality = 60

[system]
active_profile = "custom"

[profiles.custom]
description = "file profile"

[profiles.custom.head_tracking]
deadzone = 1.2
"#
        )
        .unwrap();

        let config = HeadcastConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.height, 720);
        assert_eq!(config.capture.fps, 60);
        assert_eq!(config.stream.quality, 60);

        let custom = config.active_profile().unwrap();
        assert_eq!(custom.name, "custom");
        assert_eq!(custom.head_tracking.deadzone, 1.2);
        assert_eq!(custom.head_tracking.smoothing, 0.15);

        // Builtins survive a file that defines its own profiles
        assert!(config.profiles.contains_key("default"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HeadcastConfig::load_from_file(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.capture.width, 1920);
        assert_eq!(config.gesture.cooldown_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("HEADCAST_SYSTEM__STATS_INTERVAL_SECONDS", "17");

        let dir = tempfile::tempdir().unwrap();
        let config = HeadcastConfig::load_from_file(dir.path().join("absent.toml"));

        env::remove_var("HEADCAST_SYSTEM__STATS_INTERVAL_SECONDS");

        assert_eq!(config.unwrap().system.stats_interval_seconds, 17);
    }

    #[test]
    fn test_to_toml_round_trip() {
        let config = HeadcastConfig::default();
        let text = config.to_toml().unwrap();

        assert!(text.contains("[capture]"));
        let parsed: HeadcastConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.stream.quality, config.stream.quality);
        assert_eq!(parsed.profiles.len(), config.profiles.len());
    }
}
