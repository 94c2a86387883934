//! Configuration for the activity sensor agent.

use crate::geometry::DisplayFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::error::ConfigError;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Downward mounting tilt of the sensor, in degrees
    pub tilt_degrees: f64,

    /// Display frame that activity areas are expressed in
    pub display: DisplayFrame,

    /// Body orientation calibration
    pub orientation: OrientationConfig,

    /// Session and recording timing
    pub session: SessionConfig,

    /// Furniture template localization
    pub localizer: LocalizerConfig,

    /// Tagged objects and how they are sampled
    pub objects: ObjectsConfig,

    /// Activity catalogue file
    pub activities_path: PathBuf,

    /// Directory that record files are written to
    pub records_path: PathBuf,

    /// Directory for session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-sensor-agent");

        Self {
            tilt_degrees: 9.0,
            display: DisplayFrame::default(),
            orientation: OrientationConfig::default(),
            session: SessionConfig::default(),
            localizer: LocalizerConfig::default(),
            objects: ObjectsConfig::default(),
            activities_path: Self::config_dir().join("activities.json"),
            records_path: data_dir.join("records"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-sensor-agent")
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.records_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Calibration for the orientation classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Shoulder depth difference of a person standing side-on (metres)
    pub max_shoulder_z_diff: f32,
    /// Divisor splitting side-on from frontal
    pub boundary: f32,
    /// Closest range the sensor reports reliably (cm)
    pub min_reliable_distance_cm: f64,
    /// Occlusion count at which a frontal person is facing away, per distance band
    pub band_thresholds: [u32; 4],
    /// Side of the square depth window around the head (pixels)
    pub occlusion_window: usize,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            max_shoulder_z_diff: 0.274,
            boundary: 2.0,
            min_reliable_distance_cm: 50.0,
            band_thresholds: [1, 2, 30, 55],
            occlusion_window: 16,
        }
    }
}

/// Session and recording timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long the room must stay empty before recording stops
    #[serde(with = "duration_millis")]
    pub stop_interval: Duration,

    /// How long an activity may drop out before its occurrence is closed
    #[serde(with = "duration_millis")]
    pub activity_debounce: Duration,

    /// Uptime after which a restart is requested once recording has started
    #[serde(with = "duration_secs")]
    pub restart_after: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_interval: Duration::from_millis(5000),
            activity_debounce: Duration::from_millis(5000),
            restart_after: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Furniture template localization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Time between background scans
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Height map width (cm, one cell per cm)
    pub grid_width: usize,
    /// Height map depth (cm)
    pub grid_height: usize,
    /// Total margin added around a located template (cm)
    pub extension: f64,
    /// Points at or below this height are treated as under the floor (cm)
    pub height_floor_cm: f32,
    /// Points at or above this height are treated as ceiling/clutter (cm)
    pub height_ceiling_cm: f32,
    /// Directory template files are resolved against
    pub template_dir: PathBuf,
    pub templates: Vec<TemplateSpec>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            grid_width: 900,
            grid_height: 450,
            extension: 100.0,
            height_floor_cm: -255.0,
            height_ceiling_cm: -50.0,
            template_dir: PathBuf::from("templates"),
            templates: vec![TemplateSpec {
                name: "Table".to_string(),
                file: "Table.txt".to_string(),
                width: 150,
                height: 70,
                slide_width: 30,
                slide_height: 20,
                color: "red".to_string(),
                max_mean_error: None,
            }],
        }
    }
}

/// One entry of the template catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    /// File name relative to the template directory
    pub file: String,
    pub width: usize,
    pub height: usize,
    pub slide_width: usize,
    pub slide_height: usize,
    pub color: String,
    /// Reject a fit whose mean absolute error per cell exceeds this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mean_error: Option<f32>,
}

/// Tagged object sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsConfig {
    /// Period over which tag reads are averaged
    #[serde(with = "duration_millis")]
    pub update_interval: Duration,
    pub objects: Vec<ObjectSpec>,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        let spec = |name: &str, tag: &str, antenna_port: u16, rssi_threshold: f64| ObjectSpec {
            name: name.to_string(),
            tag_id: format!("0000 0000 0000 0000 0000 {tag}"),
            antenna_port,
            rssi_threshold,
        };

        Self {
            update_interval: Duration::from_secs(1),
            objects: vec![
                spec("Book", "001E", 4, -60.0),
                spec("Bowl", "0017", 4, -65.0),
                spec("Cup", "0016", 4, -65.0),
                spec("Marker", "0010", 3, -55.0),
                spec("Mouse", "0205", 4, -55.0),
            ],
        }
    }
}

/// A tagged object the reader watches for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub name: String,
    /// EPC of the attached tag
    pub tag_id: String,
    /// Only reads from this antenna count
    pub antenna_port: u16,
    /// Mean RSSI (dBm) at or above which the object is in use
    pub rssi_threshold: f64,
}

/// Serde support for Duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
