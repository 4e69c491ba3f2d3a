//! Runtime configuration.
//!
//! Every field has a default matching the reference deployment. A TOML file
//! overrides the defaults and `LEAFGUARD_*` environment variables override
//! the file for the settings that usually differ per host.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Severity;

/// Upper bound for the cooldown and staleness intervals, in seconds.
pub const MAX_INTERVAL_SECS: u64 = 86_400 * 365;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeafguardConfig {
    pub vision: VisionConfig,
    pub smoothing: SmoothingConfig,
    pub sensors: SensorConfig,
    pub irrigation: IrrigationConfig,
    pub actuation: ActuationConfig,
    pub capture: CaptureConfig,
    pub classifier: ClassifierConfig,
    pub server: ServerConfig,
    pub activity: ActivityConfig,
}

/// ROI geometry and classifier gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Side of the centered square cropped from each frame, in pixels.
    pub roi_size: u32,
    /// Side of the square the models expect; the ROI is resized to this.
    pub model_input_size: u32,
    /// Minimum plant probability before the severity model is consulted.
    pub presence_threshold: f64,
    /// Severity predictions below this confidence do not move the smoother.
    pub min_severity_confidence: f64,
    /// Severity label for each output index of the severity model.
    pub severity_labels: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            roi_size: 300,
            model_input_size: 224,
            presence_threshold: 0.99,
            min_severity_confidence: 0.35,
            severity_labels: ["healthy", "high", "low", "medium"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub window_size: usize,
    pub alpha: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            alpha: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Readings older than this are treated as absent.
    pub staleness_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { staleness_secs: 10 }
    }
}

impl SensorConfig {
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_secs as i64)
    }
}

/// Spray time per severity level, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprayDurations {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for SprayDurations {
    fn default() -> Self {
        Self {
            low: 2.0,
            medium: 3.5,
            high: 5.0,
        }
    }
}

impl SprayDurations {
    /// `None` for `Healthy`: healthy plants are never sprayed.
    pub fn for_severity(&self, severity: Severity) -> Option<f64> {
        match severity {
            Severity::Healthy => None,
            Severity::Low => Some(self.low),
            Severity::Medium => Some(self.medium),
            Severity::High => Some(self.high),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrrigationConfig {
    /// Irrigate only when soil moisture is below this percentage.
    pub moisture_limit: f64,
    /// Irrigate only when relative humidity is below this percentage.
    pub humidity_limit: f64,
    /// Irrigate only when air temperature is below this, in °C.
    pub temperature_limit: f64,
    /// Smoothed verdicts less stable than this never trigger.
    pub min_stability: f64,
    pub cooldown_secs: u64,
    pub durations: SprayDurations,
    pub min_duration: f64,
    pub max_duration: f64,
    /// Spray time for an operator-requested override.
    pub manual_duration: f64,
}

impl Default for IrrigationConfig {
    fn default() -> Self {
        Self {
            moisture_limit: 40.0,
            humidity_limit: 70.0,
            temperature_limit: 30.0,
            min_stability: 0.6,
            cooldown_secs: 30,
            durations: SprayDurations::default(),
            min_duration: 2.0,
            max_duration: 5.0,
            manual_duration: 3.0,
        }
    }
}

impl IrrigationConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    /// Spray duration for `severity`, clamped to `[min_duration, max_duration]`.
    pub fn duration_for(&self, severity: Severity) -> Option<f64> {
        self.durations
            .for_severity(severity)
            .map(|d| d.clamp(self.min_duration, self.max_duration))
    }

    pub fn manual_duration(&self) -> f64 {
        self.manual_duration.clamp(self.min_duration, self.max_duration)
    }
}

/// Where pump commands go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationMode {
    /// The device polls `/process` and drives its relay from the response.
    #[default]
    Reply,
    /// The server pushes commands to `actuation.endpoint`.
    Push,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    pub mode: ActuationMode,
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            mode: ActuationMode::Reply,
            endpoint: None,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureSource {
    /// Cycle through the still images in a directory.
    Directory { path: PathBuf },
    /// Fetch a JPEG snapshot from a camera URL on every tick.
    Snapshot { url: String },
}

impl Default for CaptureSource {
    fn default() -> Self {
        CaptureSource::Directory {
            path: PathBuf::from("frames"),
        }
    }
}

impl CaptureSource {
    /// `http(s)://...` selects a snapshot camera, anything else a directory.
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            CaptureSource::Snapshot {
                url: source.to_string(),
            }
        } else {
            CaptureSource::Directory {
                path: PathBuf::from(source),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CaptureSource,
    /// Best-effort processing rate.
    pub fps: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::default(),
            fps: 15,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub presence_url: String,
    pub severity_url: String,
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            presence_url: "http://127.0.0.1:8501/v1/models/presence:predict".to_string(),
            severity_url: "http://127.0.0.1:8501/v1/models/severity:predict".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Number of entries retained for `/logs`.
    pub capacity: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

impl LeafguardConfig {
    /// Load from an optional TOML file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `LEAFGUARD_*` overrides read through `lookup`.
    ///
    /// Setting `LEAFGUARD_ACTUATOR_URL` also switches actuation to push mode.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("LEAFGUARD_BIND") {
            self.server.bind = bind
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("LEAFGUARD_BIND={bind}")))?;
        }
        if let Some(url) = lookup("LEAFGUARD_ACTUATOR_URL") {
            self.actuation.mode = ActuationMode::Push;
            self.actuation.endpoint = Some(url);
        }
        if let Some(url) = lookup("LEAFGUARD_PRESENCE_URL") {
            self.classifier.presence_url = url;
        }
        if let Some(url) = lookup("LEAFGUARD_SEVERITY_URL") {
            self.classifier.severity_url = url;
        }
        if let Some(camera) = lookup("LEAFGUARD_CAMERA") {
            self.capture.source = CaptureSource::parse(&camera);
        }
        Ok(())
    }

    /// Reject settings that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let v = &self.vision;
        if v.roi_size == 0 || v.model_input_size == 0 {
            return invalid("roi_size and model_input_size must be non-zero".into());
        }
        for (name, value) in [
            ("presence_threshold", v.presence_threshold),
            ("min_severity_confidence", v.min_severity_confidence),
            ("min_stability", self.irrigation.min_stability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if v.severity_labels.is_empty() {
            return invalid("severity_labels must not be empty".into());
        }
        for label in &v.severity_labels {
            if label.parse::<Severity>().is_err() {
                return invalid(format!("unknown severity label '{label}'"));
            }
        }

        let s = &self.smoothing;
        if s.window_size == 0 {
            return invalid("smoothing.window_size must be at least 1".into());
        }
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            return invalid(format!("smoothing.alpha must be within (0, 1], got {}", s.alpha));
        }

        let i = &self.irrigation;
        if !(i.min_duration > 0.0 && i.min_duration <= i.max_duration) {
            return invalid(format!(
                "duration bounds must satisfy 0 < min <= max, got [{}, {}]",
                i.min_duration, i.max_duration
            ));
        }
        let d = &i.durations;
        if !(d.low <= d.medium && d.medium <= d.high) {
            return invalid(format!(
                "spray durations must be non-decreasing in severity, got low={} medium={} high={}",
                d.low, d.medium, d.high
            ));
        }
        for (name, value) in [("low", d.low), ("medium", d.medium), ("high", d.high)] {
            if value < i.min_duration || value > i.max_duration {
                return invalid(format!(
                    "spray duration {name}={value} outside [{}, {}]",
                    i.min_duration, i.max_duration
                ));
            }
        }

        for (name, secs) in [
            ("irrigation.cooldown_secs", i.cooldown_secs),
            ("sensors.staleness_secs", self.sensors.staleness_secs),
        ] {
            if !(1..=MAX_INTERVAL_SECS).contains(&secs) {
                return invalid(format!(
                    "{name} must be within [1, {MAX_INTERVAL_SECS}], got {secs}"
                ));
            }
        }

        if self.capture.fps == 0 {
            return invalid("capture.fps must be at least 1".into());
        }
        if self.activity.capacity == 0 {
            return invalid("activity.capacity must be at least 1".into());
        }
        if self.actuation.mode == ActuationMode::Push && self.actuation.endpoint.is_none() {
            return invalid("actuation.mode = push requires actuation.endpoint".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        LeafguardConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = LeafguardConfig::from_toml_str(
            r#"
            [irrigation]
            cooldown_secs = 90

            [smoothing]
            alpha = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.irrigation.cooldown_secs, 90);
        assert_eq!(config.irrigation.moisture_limit, 40.0);
        assert_eq!(config.smoothing.alpha, 0.5);
        assert_eq!(config.smoothing.window_size, 20);
    }

    #[test]
    fn capture_source_is_tagged() {
        let config = LeafguardConfig::from_toml_str(
            r#"
            [capture.source]
            kind = "snapshot"
            url = "http://camera.local/still.jpg"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.capture.source,
            CaptureSource::Snapshot {
                url: "http://camera.local/still.jpg".into()
            }
        );
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("LEAFGUARD_BIND", "127.0.0.1:8080"),
            ("LEAFGUARD_ACTUATOR_URL", "http://pi.local:5000/pump"),
            ("LEAFGUARD_CAMERA", "/var/lib/leafguard/frames"),
        ]
        .into_iter()
        .collect();

        let mut config = LeafguardConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.actuation.mode, ActuationMode::Push);
        assert_eq!(
            config.actuation.endpoint.as_deref(),
            Some("http://pi.local:5000/pump")
        );
        assert_eq!(
            config.capture.source,
            CaptureSource::Directory {
                path: PathBuf::from("/var/lib/leafguard/frames")
            }
        );
    }

    #[test]
    fn bad_bind_override_is_rejected() {
        let mut config = LeafguardConfig::default();
        let err = config
            .apply_overrides(|k| (k == "LEAFGUARD_BIND").then(|| "not-an-addr".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn non_monotonic_durations_rejected() {
        let mut config = LeafguardConfig::default();
        config.irrigation.durations.medium = 4.5;
        config.irrigation.durations.high = 4.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_outside_bounds_rejected() {
        let mut config = LeafguardConfig::default();
        config.irrigation.durations.high = 8.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn alpha_and_window_checked() {
        let mut config = LeafguardConfig::default();
        config.smoothing.alpha = 0.0;
        assert!(config.validate().is_err());

        let mut config = LeafguardConfig::default();
        config.smoothing.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn interval_bounds_checked() {
        let config = LeafguardConfig::from_toml_str("[irrigation]\ncooldown_secs = 10000000000000")
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config =
            LeafguardConfig::from_toml_str("[sensors]\nstaleness_secs = 9223372036854775807")
                .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = LeafguardConfig::default();
        config.irrigation.cooldown_secs = 0;
        assert!(config.validate().is_err());

        let mut config = LeafguardConfig::default();
        config.sensors.staleness_secs = 0;
        assert!(config.validate().is_err());

        let mut config = LeafguardConfig::default();
        config.irrigation.cooldown_secs = MAX_INTERVAL_SECS;
        config.sensors.staleness_secs = MAX_INTERVAL_SECS;
        config.validate().unwrap();
        // The longest accepted cooldown still fits in a timestamp.
        let engine = crate::engine::IrrigationEngine::new(config.irrigation.clone());
        let sensors = crate::sensors::SensorStore::from_config(&config.sensors);
        let verdict = crate::smoother::SmoothedVerdict::empty();
        let now = chrono::Utc::now();
        engine.request_manual_spray();
        assert!(engine.evaluate(&verdict, &sensors.snapshot(now), now).should_irrigate);
        let held = engine.evaluate(&verdict, &sensors.snapshot(now), now);
        assert_eq!(held.reason, crate::domain::DecisionReason::Cooldown);
        assert_eq!(config.sensors.staleness().num_seconds(), MAX_INTERVAL_SECS as i64);
    }

    #[test]
    fn push_mode_needs_endpoint() {
        let mut config = LeafguardConfig::default();
        config.actuation.mode = ActuationMode::Push;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_severity_label_rejected() {
        let mut config = LeafguardConfig::default();
        config.vision.severity_labels = vec!["healthy".into(), "wilted".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_mapping_is_clamped() {
        let mut irrigation = IrrigationConfig::default();
        irrigation.durations.low = 0.5;
        assert_eq!(irrigation.duration_for(Severity::Low), Some(2.0));
        assert_eq!(irrigation.duration_for(Severity::Healthy), None);
        assert_eq!(irrigation.duration_for(Severity::High), Some(5.0));
    }
}
