pub mod common;
mod ort;
mod person;

use std::path::PathBuf;

pub use self::ort::{OrtPoseEngine, TrackingConfig};
use crate::{
    config::AppConfig,
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    types::{Frame, Landmark},
};

/// Per-frame result of a pose engine. `landmarks` is empty when no person was
/// found, otherwise it holds the 33 body landmarks in frame-normalized space.
#[derive(Clone, Debug, Default)]
pub struct PoseOutput {
    pub landmarks: Vec<Landmark>,
    pub confidence: f32,
}

pub trait PoseEngine: Send {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<PoseOutput>;

    /// Drops any state carried between frames of one video.
    fn reset(&mut self) {}
}

#[derive(Clone, Debug)]
pub struct EstimatorBackend {
    pose_model_path: PathBuf,
    person_detector_model_path: PathBuf,
    tracking: TrackingConfig,
}

impl EstimatorBackend {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pose_model_path: config.pose_estimator_model_path(),
            person_detector_model_path: config.person_detector_model_path(),
            tracking: TrackingConfig {
                min_detection_confidence: config.min_detection_confidence,
                min_tracking_confidence: config.min_tracking_confidence,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        "ort"
    }

    pub fn model_path(&self, model: ModelKind) -> &PathBuf {
        match model {
            ModelKind::PoseEstimator => &self.pose_model_path,
            ModelKind::PersonDetector => &self.person_detector_model_path,
        }
    }

    pub fn models_present(&self) -> bool {
        ModelKind::ALL
            .iter()
            .all(|model| self.model_path(*model).exists())
    }

    /// Downloads whichever models are missing.
    pub fn ensure_models<F>(&self, mut on_event: F) -> anyhow::Result<()>
    where
        F: FnMut(ModelDownloadEvent),
    {
        for model in ModelKind::ALL {
            ensure_model_ready(model, self.model_path(model), &mut on_event)?;
        }
        Ok(())
    }

    pub fn load(&self) -> anyhow::Result<OrtPoseEngine> {
        self.ensure_models(|_evt| {})?;
        let engine = OrtPoseEngine::new(
            &self.pose_model_path,
            &self.person_detector_model_path,
            self.tracking,
        )?;
        log::info!(
            "pose {} backend ready using {} and person detector {}",
            self.label(),
            self.pose_model_path.display(),
            self.person_detector_model_path.display()
        );
        Ok(engine)
    }
}
