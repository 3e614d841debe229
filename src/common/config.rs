use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FaceAuthError, Result};
use crate::core::embedding::DistanceMetric;

pub const DEFAULT_CONFIG_PATH: &str = "configs/face-auth.toml";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/facegate/face-auth.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_warmup_frames() -> u32 { 5 }
fn default_warmup_delay() -> u64 { 50 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
}

fn default_detection_confidence() -> f32 { 0.5 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub input_size: u32,
    pub normalization_value: f32,
    /// 1 for grayscale (IR) models, 3 for RGB models.
    #[serde(default = "default_input_channels")]
    pub input_channels: u32,
}

fn default_input_channels() -> u32 { 1 }

/// Thresholds for the two comparisons the match engine performs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Login: a record is eligible only when its distance is strictly below this.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f32,
    /// Registration: a candidate at or below this distance is the same person.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,
}

fn default_accept_threshold() -> f32 { 0.55 }
fn default_duplicate_threshold() -> f32 { 0.6 }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::default(),
            accept_threshold: default_accept_threshold(),
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the platform data directory outside dev mode.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_socket_path() -> PathBuf { PathBuf::from("/run/facegate/service.sock") }
fn default_read_timeout() -> u64 { 10 }
fn default_write_timeout() -> u64 { 5 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Dev mode reads the repository config, otherwise the system config if present.
    pub fn load_for_mode(dev: bool) -> Result<Self> {
        let system = Path::new(SYSTEM_CONFIG_PATH);
        if !dev && system.exists() {
            Self::load_from_path(system)
        } else {
            Self::load()
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAuthError::Config(format!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceAuthError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceAuthError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceAuthError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(FaceAuthError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceAuthError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceAuthError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceAuthError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.normalization_value == 0.0 {
            return Err(FaceAuthError::Config(
                "Recognizer normalization value must be non-zero".into()
            ));
        }

        // Thresholds are policy, not derived constants: only sanity is enforced.
        for (name, value) in [
            ("accept_threshold", self.matching.accept_threshold),
            ("duplicate_threshold", self.matching.duplicate_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FaceAuthError::Config(format!(
                    "Matching {} must be a non-negative number, got {}", name, value
                )));
            }
        }
        if self.matching.duplicate_threshold < self.matching.accept_threshold {
            tracing::warn!(
                "duplicate_threshold {} is stricter than accept_threshold {}; \
                 faces that can log in may still register twice",
                self.matching.duplicate_threshold,
                self.matching.accept_threshold
            );
        }

        if self.service.read_timeout_secs == 0 || self.service.write_timeout_secs == 0 {
            return Err(FaceAuthError::Config("Service timeouts must be at least 1 second".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[camera]
device_index = 0
width = 640
height = 480

[models]
detector_path = "models/face_detector.onnx"
recognizer_path = "models/face_embedding.onnx"

[detector]
input_width = 640
input_height = 640

[recognizer]
input_size = 112
normalization_value = 127.5
"#;

    #[test]
    fn minimal_config_gets_matching_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.matching.metric, DistanceMetric::Euclidean);
        assert!((config.matching.accept_threshold - 0.55).abs() < f32::EPSILON);
        assert!((config.matching.duplicate_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.camera.warmup_frames, 5);
        assert_eq!(config.service.socket_path, PathBuf::from("/run/facegate/service.sock"));
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn matching_section_overrides_defaults() {
        let toml = format!(
            "{}\n[matching]\nmetric = \"cosine\"\naccept_threshold = 0.3\nduplicate_threshold = 0.4\n",
            MINIMAL
        );
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.matching.metric, DistanceMetric::Cosine);
        assert!((config.matching.accept_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let toml = format!("{}\n[matching]\naccept_threshold = -0.1\n", MINIMAL);
        match Config::from_toml(&toml) {
            Err(FaceAuthError::Config(msg)) => assert!(msg.contains("accept_threshold")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn zero_camera_width_is_rejected() {
        let toml = MINIMAL.replace("width = 640", "width = 0");
        assert!(matches!(Config::from_toml(&toml), Err(FaceAuthError::Config(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load_from_path(Path::new("/nonexistent/face-auth.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/face-auth.toml"));
    }
}
