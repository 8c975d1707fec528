use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::model_download::{PERSON_DETECTOR_MODEL_FILENAME, POSE_ESTIMATOR_MODEL_FILENAME};

pub const CONFIG_FILENAME: &str = "bone-analyzer.json";
const ENV_PREFIX: &str = "BONE_ANALYZER_";

pub const VISUALIZED_DIR: &str = "visualized";
pub const LANDMARKS_DIR: &str = "landmarks_data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root for `visualized/` and `landmarks_data/`.
    pub output_dir: PathBuf,
    pub model_dir: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// ffmpeg encoder name for the visualized video.
    pub video_codec: String,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Landmarks below this visibility are not drawn.
    pub visibility_threshold: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            model_dir: PathBuf::from("models"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            video_codec: "mpeg4".to_string(),
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            visibility_threshold: 0.5,
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid by `bone-analyzer.json` in the working directory (if
    /// any), overlaid by `BONE_ANALYZER_*` environment variables.
    pub fn load() -> Self {
        let mut config = match Self::from_file(Path::new(CONFIG_FILENAME)) {
            Ok(Some(config)) => {
                log::info!("loaded configuration from {CONFIG_FILENAME}");
                config
            }
            Ok(None) => Self::default(),
            Err(err) => {
                log::error!("ignoring invalid {CONFIG_FILENAME}: {err:#}");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
        config
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FFMPEG") {
            self.ffmpeg = PathBuf::from(v);
        }
        if let Some(v) = lookup("FFPROBE") {
            self.ffprobe = PathBuf::from(v);
        }
        if let Some(v) = lookup("VIDEO_CODEC") {
            self.video_codec = v;
        }
        for (key, slot) in [
            ("MIN_DETECTION_CONFIDENCE", &mut self.min_detection_confidence),
            ("MIN_TRACKING_CONFIDENCE", &mut self.min_tracking_confidence),
            ("VISIBILITY_THRESHOLD", &mut self.visibility_threshold),
        ] {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<f32>() {
                    Ok(value) => *slot = value.clamp(0.0, 1.0),
                    Err(err) => log::warn!("ignoring {ENV_PREFIX}{key}={raw:?}: {err}"),
                }
            }
        }
    }

    pub fn visualized_dir(&self) -> PathBuf {
        self.output_dir.join(VISUALIZED_DIR)
    }

    pub fn landmarks_dir(&self) -> PathBuf {
        self.output_dir.join(LANDMARKS_DIR)
    }

    pub fn pose_estimator_model_path(&self) -> PathBuf {
        self.model_dir.join(POSE_ESTIMATOR_MODEL_FILENAME)
    }

    pub fn person_detector_model_path(&self) -> PathBuf {
        self.model_dir.join(PERSON_DETECTOR_MODEL_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_layout_matches_output_tree() {
        let config = AppConfig::default();
        assert_eq!(config.visualized_dir(), Path::new("output/visualized"));
        assert_eq!(config.landmarks_dir(), Path::new("output/landmarks_data"));
        assert!(
            config
                .pose_estimator_model_path()
                .starts_with(Path::new("models"))
        );
    }

    #[test]
    fn overrides_replace_fields_and_skip_bad_numbers() {
        let vars: HashMap<&str, &str> = [
            ("OUTPUT_DIR", "/tmp/out"),
            ("VIDEO_CODEC", "libx264"),
            ("MIN_DETECTION_CONFIDENCE", "0.7"),
            ("MIN_TRACKING_CONFIDENCE", "not-a-number"),
            ("VISIBILITY_THRESHOLD", "3.0"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.video_codec, "libx264");
        assert!((config.min_detection_confidence - 0.7).abs() < f32::EPSILON);
        assert!((config.min_tracking_confidence - 0.5).abs() < f32::EPSILON);
        assert!((config.visibility_threshold - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, r#"{ "video_codec": "libx264", "model_dir": "weights" }"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap().expect("file exists");
        assert_eq!(config.video_codec, "libx264");
        assert_eq!(config.model_dir, PathBuf::from("weights"));
        assert_eq!(config.output_dir, PathBuf::from("output"));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::from_file(&path).is_err());
        assert!(
            AppConfig::from_file(&dir.path().join("missing.json"))
                .unwrap()
                .is_none()
        );
    }
}
