//! Configuration types for movedict

use crate::{Error, Result, DEFAULT_FRAME_RATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Skeleton rendering parameters
///
/// One color is used for both bones and joints. Immutable once built and
/// passed explicitly to the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySpec {
    /// Overlay color as RGB
    pub color: [u8; 3],
    /// Bone line thickness in pixels
    pub bone_thickness: u32,
    /// Joint circle radius in pixels
    pub joint_radius: u32,
    /// Landmarks reporting a lower visibility are not drawn
    pub visibility_threshold: f32,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            color: [255, 192, 203],
            bone_thickness: 6,
            joint_radius: 5,
            visibility_threshold: 0.5,
        }
    }
}

impl OverlaySpec {
    pub fn with_bone_thickness(mut self, thickness: u32) -> Self {
        self.bone_thickness = thickness;
        self
    }

    pub fn with_joint_radius(mut self, radius: u32) -> Self {
        self.joint_radius = radius;
        self
    }
}

/// Settings handed to every pose estimator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Executable that serves pose inference over stdin/stdout; `None` runs
    /// the bundled MediaPipe sidecar with `python`
    pub command: Option<PathBuf>,
    /// Interpreter for the bundled sidecar
    pub python: PathBuf,
    /// Extra arguments passed before the generated ones
    pub args: Vec<String>,
    /// Treat every frame as an unrelated image (disables tracking)
    pub static_image_mode: bool,
    /// Model size: 0 (lite), 1 (full) or 2 (heavy)
    pub model_complexity: u8,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub enable_segmentation: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            command: None,
            python: PathBuf::from("python3"),
            args: Vec::new(),
            static_image_mode: false,
            model_complexity: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            enable_segmentation: false,
        }
    }
}

/// Main configuration for movedict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding finished clips
    pub output_dir: PathBuf,
    /// Directory where raw recordings are staged before processing
    pub upload_dir: PathBuf,
    /// Frame rate used when the input reports none
    pub default_frame_rate: f64,
    /// H.264 bitrate in kbps
    pub bitrate_kbps: u32,
    /// ffmpeg executable used for decoding
    pub ffmpeg: PathBuf,
    /// ffprobe executable used for stream inspection
    pub ffprobe: PathBuf,
    pub overlay: OverlaySpec,
    pub estimator: EstimatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("movement_dictionary"),
            upload_dir: PathBuf::from("uploads"),
            default_frame_rate: DEFAULT_FRAME_RATE,
            bitrate_kbps: 2000,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            overlay: OverlaySpec::default(),
            estimator: EstimatorConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!("Loaded configuration from {:?}: {:?}", path, config);
        Ok(config)
    }

    /// Builder pattern: set output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder pattern: set upload staging directory
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Builder pattern: set bitrate
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.default_frame_rate.is_finite() && self.default_frame_rate > 0.0) {
            return Err(Error::Config(format!(
                "default frame rate must be positive, got {}",
                self.default_frame_rate
            )));
        }
        if self.bitrate_kbps == 0 {
            return Err(Error::Config("bitrate must be non-zero".to_string()));
        }
        if self.estimator.model_complexity > 2 {
            return Err(Error::Config(format!(
                "model complexity must be 0, 1 or 2, got {}",
                self.estimator.model_complexity
            )));
        }
        for (name, value) in [
            ("min detection confidence", self.estimator.min_detection_confidence),
            ("min tracking confidence", self.estimator.min_tracking_confidence),
            ("visibility threshold", self.overlay.visibility_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within 0.0-1.0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_frame_rate, 20.0);
        assert_eq!(config.overlay.color, [255, 192, 203]);
        assert!(!config.estimator.static_image_mode);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"bitrate_kbps": 500, "overlay": {"joint_radius": 3}}"#)
                .unwrap();
        assert_eq!(config.bitrate_kbps, 500);
        assert_eq!(config.overlay.joint_radius, 3);
        assert_eq!(config.overlay.bone_thickness, 6);
        assert_eq!(config.output_dir, PathBuf::from("movement_dictionary"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"output_dir": "clips", "estimator": {"command": "/opt/pose/serve"}}"#,
        )
        .unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("clips"));
        assert_eq!(config.estimator.command, Some(PathBuf::from("/opt/pose/serve")));
        assert_eq!(config.estimator.python, PathBuf::from("python3"));

        std::fs::write(&path, r#"{"bitrate_kbps": 0}"#).unwrap();
        assert!(matches!(Config::from_json_file(&path), Err(Error::Config(_))));
        assert!(matches!(
            Config::from_json_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_confidence() {
        let mut config = Config::default();
        config.estimator.min_tracking_confidence = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
