use crate::cli::RunArgs;
use crate::density::DensityThresholds;
use crate::email::EmailConfig;
use crate::tracker::IouTrackerConfig;
use crate::zone::{Zone, ZoneError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use usls::{Config, NAMES_COCO_80};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no zones configured")]
    NoZones,
    #[error("zone name {0} is defined more than once")]
    DuplicateZone(String),
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error("alert threshold must be at least 1")]
    ZeroAlertThreshold,
    #[error("tracker {0} must be at least 1")]
    ZeroTrackerSetting(&'static str),
    #[error("tracker min_iou must be within (0, 1], got {0}")]
    MinIou(f64),
    #[error("detector confidence must be within [0, 1], got {0}")]
    Confidence(f32),
    #[error("detector class {0} is not a COCO class name")]
    UnknownClass(String),
    #[error("alert sound volume must be a finite non-negative gain, got {0}")]
    Volume(f32),
    #[error("dispatch queue must hold at least one request")]
    ZeroDispatchQueue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    /// Polygon vertices in frame pixels, in drawing order
    pub points: Vec<[f64; 2]>,
}

impl ZoneConfig {
    fn new(name: &str, points: &[[f64; 2]]) -> Self {
        Self {
            name: name.to_string(),
            points: points.to_vec(),
        }
    }

    pub fn build(&self) -> Result<Zone, ZoneError> {
        let points: Vec<(f64, f64)> = self.points.iter().map(|[x, y]| (*x, *y)).collect();
        Zone::new(self.name.clone(), &points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Count at or above which a zone is in breach
    pub threshold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_age: u32,
    pub n_init: u32,
    pub min_iou: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let defaults = IouTrackerConfig::default();
        Self {
            max_age: defaults.max_age,
            n_init: defaults.n_init,
            min_iou: defaults.min_iou,
        }
    }
}

impl From<TrackerConfig> for IouTrackerConfig {
    fn from(config: TrackerConfig) -> Self {
        Self {
            max_age: config.max_age,
            n_init: config.n_init,
            min_iou: config.min_iou,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum detection confidence
    pub confidence: f32,
    /// The single object class counted
    pub class_name: String,
}

impl DetectorConfig {
    /// Index of the monitored class in the model's label set
    pub fn class_id(&self) -> Option<usize> {
        NAMES_COCO_80.iter().position(|name| *name == self.class_name)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            class_name: "person".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub file: PathBuf,
    pub duration_secs: f64,
    /// Playback gain, 1.0 plays the file unchanged
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("alert.mp3"),
            duration_secs: 5.0,
            volume: 1.0,
        }
    }
}

impl AudioConfig {
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }
}

/// Everything the monitor needs besides the video source and model options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub zones: Vec<ZoneConfig>,
    /// Live per-frame status tiers
    pub display: DensityThresholds,
    /// Status tiers used when reading the event log back
    pub dashboard: DensityThresholds,
    pub alert: AlertConfig,
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
    pub audio: Option<AudioConfig>,
    pub email: Option<EmailConfig>,
    pub event_log: PathBuf,
    pub dispatch_queue: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            zones: vec![
                ZoneConfig::new("Zone A", &[[50.0, 50.0], [400.0, 50.0], [400.0, 400.0], [50.0, 400.0]]),
                ZoneConfig::new("Zone B", &[[450.0, 50.0], [800.0, 50.0], [800.0, 400.0], [450.0, 400.0]]),
            ],
            display: DensityThresholds::DISPLAY_DEFAULT,
            dashboard: DensityThresholds::DASHBOARD_DEFAULT,
            alert: AlertConfig { threshold: 13 },
            tracker: TrackerConfig::default(),
            detector: DetectorConfig::default(),
            audio: Some(AudioConfig::default()),
            email: None,
            event_log: PathBuf::from("logs/zone_counts.csv"),
            dispatch_queue: 16,
        }
    }
}

impl MonitorConfig {
    /// Loads a JSON config file, or the built-in defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: MonitorConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_zones()?;
        if self.alert.threshold == 0 {
            return Err(ConfigError::ZeroAlertThreshold);
        }
        if self.tracker.max_age == 0 {
            return Err(ConfigError::ZeroTrackerSetting("max_age"));
        }
        if self.tracker.n_init == 0 {
            return Err(ConfigError::ZeroTrackerSetting("n_init"));
        }
        if !(self.tracker.min_iou > 0.0 && self.tracker.min_iou <= 1.0) {
            return Err(ConfigError::MinIou(self.tracker.min_iou));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(ConfigError::Confidence(self.detector.confidence));
        }
        if self.detector.class_id().is_none() {
            return Err(ConfigError::UnknownClass(self.detector.class_name.clone()));
        }
        if let Some(audio) = &self.audio {
            if !(audio.volume.is_finite() && audio.volume >= 0.0) {
                return Err(ConfigError::Volume(audio.volume));
            }
        }
        if self.dispatch_queue == 0 {
            return Err(ConfigError::ZeroDispatchQueue);
        }
        Ok(())
    }

    /// Builds the zone polygons, rejecting empty, duplicate or degenerate zones
    pub fn build_zones(&self) -> Result<Vec<Zone>, ConfigError> {
        if self.zones.is_empty() {
            return Err(ConfigError::NoZones);
        }
        let mut seen = HashSet::new();
        let mut zones = Vec::with_capacity(self.zones.len());
        for zone in &self.zones {
            if !seen.insert(zone.name.as_str()) {
                return Err(ConfigError::DuplicateZone(zone.name.clone()));
            }
            zones.push(zone.build()?);
        }
        Ok(zones)
    }
}

/// Builds a YOLO model configuration from command line arguments
pub fn build_model_config(args: &RunArgs, detector: &DetectorConfig) -> Result<Config> {
    let mut config = Config::yolo()
        .with_model_file(args.model.as_ref().map_or("", String::as_str))
        .with_task(args.task.parse()?)
        .with_version(args.ver.try_into()?)
        .with_scale(args.scale.parse()?)
        .with_model_dtype(args.dtype.parse()?)
        .with_model_device(args.device.parse()?)
        .with_class_confs(&[detector.confidence])
        .with_class_names(&NAMES_COCO_80)
        .with_model_num_dry_run(2);

    // only keep the monitored class in the model output
    let class_id = detector
        .class_id()
        .ok_or_else(|| ConfigError::UnknownClass(detector.class_name.clone()))?;
    config = config.retain_classes(&[class_id]);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        let zones = config.build_zones().unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].name(), "Zone A");
        assert_eq!(config.display.overcrowded(), 11);
        assert_eq!(config.dashboard.overcrowded(), 10);
        assert_eq!(config.alert.threshold, 13);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "zones": [{"name": "Gate", "points": [[0, 0], [10, 0], [10, 10]]}],
                "alert": {"threshold": 4},
                "email": {"sender": "a@example.com", "recipient": "b@example.com"}
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.zones.len(), 1);
        assert_eq!(config.alert.threshold, 4);
        assert_eq!(config.display, MonitorConfig::default().display);
        assert_eq!(config.tracker.max_age, 30);
        assert_eq!(config.detector.class_name, "person");
        assert_eq!(config.email.unwrap().smtp_port, 587);
    }

    #[test]
    fn test_thresholds_are_independent() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "display": {"moderate": 2, "overcrowded": 5},
                "dashboard": {"moderate": 3, "overcrowded": 4},
                "alert": {"threshold": 40}
            }"#,
        )
        .unwrap();
        assert_eq!(config.display.moderate(), 2);
        assert_eq!(config.dashboard.overcrowded(), 4);
        assert_eq!(config.alert.threshold, 40);
    }

    #[test]
    fn test_fatal_validation_errors() {
        let mut config = MonitorConfig::default();
        config.zones.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoZones));

        let mut config = MonitorConfig::default();
        config.zones[1].name = "Zone A".to_string();
        assert_eq!(config.validate(), Err(ConfigError::DuplicateZone("Zone A".to_string())));

        let mut config = MonitorConfig::default();
        config.zones[0].points.truncate(2);
        assert!(matches!(config.validate(), Err(ConfigError::Zone(ZoneError::TooFewPoints { .. }))));

        let mut config = MonitorConfig::default();
        config.alert.threshold = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroAlertThreshold));

        let mut config = MonitorConfig::default();
        config.tracker.n_init = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTrackerSetting("n_init")));

        let mut config = MonitorConfig::default();
        config.detector.confidence = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::Confidence(1.5)));

        for class_name in ["people", "Person", ""] {
            let mut config = MonitorConfig::default();
            config.detector.class_name = class_name.to_string();
            assert_eq!(config.validate(), Err(ConfigError::UnknownClass(class_name.to_string())));
        }

        let mut config = MonitorConfig::default();
        config.detector.class_name = "car".to_string();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.detector.class_id(), Some(2));

        let mut config = MonitorConfig::default();
        if let Some(audio) = config.audio.as_mut() {
            audio.volume = -0.5;
        }
        assert_eq!(config.validate(), Err(ConfigError::Volume(-0.5)));
    }

    #[test]
    fn test_invalid_thresholds_fail_to_parse() {
        let parsed = serde_json::from_str::<MonitorConfig>(r#"{"display": {"moderate": 11, "overcrowded": 8}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = MonitorConfig::load(Some(Path::new("/no/such/crowdwatch.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
        assert_eq!(MonitorConfig::load(None).unwrap(), MonitorConfig::default());
    }

    #[test]
    fn test_audio_duration() {
        assert_eq!(AudioConfig::default().duration(), Duration::from_secs(5));
        let negative = AudioConfig {
            file: PathBuf::from("a.mp3"),
            duration_secs: -1.0,
            volume: 1.0,
        };
        assert_eq!(negative.duration(), Duration::ZERO);
    }
}
