use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    PoseEngine, PoseOutput,
    common::{
        self, BODY_ALIGNMENT_POINT, HIP_ALIGNMENT_POINT, POSE_INPUT_SIZE, ProjectedLandmarks, Roi,
    },
    person::{PersonDetector, PersonDetectorConfig, pick_primary_region},
};
use crate::types::Frame;

#[derive(Clone, Copy, Debug)]
pub struct TrackingConfig {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

/// Two-stage pose engine: a person detector seeds the landmark model, and
/// later frames reuse the alignment points of the previous pose as long as
/// it stays confident.
pub struct OrtPoseEngine {
    pose: Session,
    person_detector: PersonDetector,
    cfg: TrackingConfig,
    tracked: Option<Roi>,
}

impl OrtPoseEngine {
    pub fn new(
        pose_model_path: &Path,
        person_detector_model_path: &Path,
        cfg: TrackingConfig,
    ) -> Result<Self> {
        let pose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(pose_model_path)
            .with_context(|| {
                format!("failed to load ORT session from {}", pose_model_path.display())
            })?;

        let person_detector = PersonDetector::new(
            person_detector_model_path,
            PersonDetectorConfig {
                score_threshold: cfg.min_detection_confidence,
                ..PersonDetectorConfig::default()
            },
        )?;

        Ok(Self {
            pose,
            person_detector,
            cfg,
            tracked: None,
        })
    }

    fn detect_roi(&mut self, frame: &Frame) -> Option<Roi> {
        let people = self.person_detector.detect(frame).unwrap_or_else(|err| {
            log::warn!("person detection failed on frame {}: {err:?}", frame.index);
            Vec::new()
        });
        pick_primary_region(&people).and_then(|person| person.roi())
    }

    fn estimate(
        &mut self,
        frame: &Frame,
        roi: &Roi,
    ) -> Result<(ProjectedLandmarks, f32)> {
        let (input, transform) = common::prepare_rotated_crop(frame, roi, POSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .pose
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "pose model returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened, &transform)?;

        let raw_confidence = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0);
        // Some exports emit the presence logit instead of a probability.
        let confidence = if (0.0..=1.0).contains(&raw_confidence) {
            raw_confidence
        } else {
            common::sigmoid(raw_confidence)
        };

        Ok((landmarks, confidence))
    }
}

impl PoseEngine for OrtPoseEngine {
    fn infer(&mut self, frame: &Frame) -> Result<PoseOutput> {
        let (roi, from_tracking) = match self.tracked.take() {
            Some(roi) => (roi, true),
            None => match self.detect_roi(frame) {
                Some(roi) => (roi, false),
                None => return Ok(PoseOutput::default()),
            },
        };

        let (mut landmarks, mut confidence) = self.estimate(frame, &roi)?;
        if from_tracking && confidence < self.cfg.min_tracking_confidence {
            log::debug!("lost track on frame {}, re-detecting", frame.index);
            let Some(roi) = self.detect_roi(frame) else {
                return Ok(PoseOutput::default());
            };
            (landmarks, confidence) = self.estimate(frame, &roi)?;
        }

        if confidence < self.cfg.min_detection_confidence {
            return Ok(PoseOutput {
                landmarks: Vec::new(),
                confidence,
            });
        }

        if confidence >= self.cfg.min_tracking_confidence {
            self.tracked = Roi::from_alignment(
                landmarks.pixels[HIP_ALIGNMENT_POINT],
                landmarks.pixels[BODY_ALIGNMENT_POINT],
            );
        }

        Ok(PoseOutput {
            landmarks: landmarks.body,
            confidence,
        })
    }

    fn reset(&mut self) {
        self.tracked = None;
    }
}
