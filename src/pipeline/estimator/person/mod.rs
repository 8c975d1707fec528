mod anchors;

use std::path::Path;

use anchors::{NUM_ANCHORS, generate_anchors};
use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{
    InputRange, LetterboxInfo, PERSON_INPUT_SIZE, Roi, prepare_frame_with_size, sigmoid,
};
use crate::types::Frame;

const PERSON_KEYPOINTS: usize = 4;
const HIP_CENTER: usize = 0;
const FULL_BODY_SCALE: usize = 1;

#[derive(Clone, Debug)]
pub struct PersonDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PersonDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 8,
        }
    }
}

/// A detected person in source pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PersonRegion {
    pub bbox: [f32; 4],
    /// Hip centre, full-body scale point, shoulder centre, upper-body scale point.
    pub keypoints: [(f32, f32); PERSON_KEYPOINTS],
    pub score: f32,
}

impl PersonRegion {
    pub fn roi(&self) -> Option<Roi> {
        Roi::from_alignment(self.keypoints[HIP_CENTER], self.keypoints[FULL_BODY_SCALE])
    }
}

pub struct PersonDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PersonDetectorConfig,
}

impl PersonDetector {
    pub fn new(model_path: &Path, cfg: PersonDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load person detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(),
            cfg,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PersonRegion>> {
        let (input, letterbox) =
            prepare_frame_with_size(frame, PERSON_INPUT_SIZE, InputRange::Signed)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run person detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "person detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let box_shape = boxes.shape().to_vec();
        let score_shape = scores.shape().to_vec();

        decode_person_outputs(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("person boxes not contiguous"))?,
            &box_shape,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("person scores not contiguous"))?,
            &score_shape,
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

fn decode_person_outputs(
    boxes: &[f32],
    box_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PersonDetectorConfig,
) -> Result<Vec<PersonRegion>> {
    if box_shape.len() < 2 || score_shape.len() < 2 {
        return Err(anyhow!(
            "unexpected person detector shapes {box_shape:?} / {score_shape:?}"
        ));
    }

    let anchor_dim = box_shape[box_shape.len() - 2];
    let feature_dim = box_shape[box_shape.len() - 1];
    let score_anchor_dim = score_shape[score_shape.len() - 2];
    let score_feature_dim = score_shape[score_shape.len() - 1].max(1);

    if feature_dim < 4 + PERSON_KEYPOINTS * 2 {
        return Err(anyhow!(
            "person box feature dimension too small: {feature_dim}"
        ));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }
    if anchor_dim != NUM_ANCHORS {
        log::debug!("person detector reports {anchor_dim} anchors, expected {NUM_ANCHORS}");
    }

    let count = anchor_dim.min(anchors.len());
    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let target_input = PERSON_INPUT_SIZE as f32;

    let mut candidates = Vec::new();
    for (anchor_idx, anchor) in anchors.iter().enumerate().take(count) {
        let raw_score = *scores
            .get(anchor_idx * score_feature_dim)
            .ok_or_else(|| anyhow!("missing score for person anchor {anchor_idx}"))?;
        let score = sigmoid(raw_score);
        if !score.is_finite() || score < cfg.score_threshold {
            continue;
        }

        let offset = anchor_idx * feature_dim;
        let features = boxes
            .get(offset..offset + 4 + PERSON_KEYPOINTS * 2)
            .ok_or_else(|| anyhow!("missing box features for person anchor {anchor_idx}"))?;

        let cx = features[0] / target_input + anchor[0];
        let cy = features[1] / target_input + anchor[1];
        let hw = features[2] / target_input / 2.0;
        let hh = features[3] / target_input / 2.0;

        let x1 = (cx - hw) * scale - pad_bias_x;
        let y1 = (cy - hh) * scale - pad_bias_y;
        let x2 = (cx + hw) * scale - pad_bias_x;
        let y2 = (cy + hh) * scale - pad_bias_y;
        // Also drops NaN boxes.
        if !(x2 > x1 && y2 > y1) {
            continue;
        }

        let mut keypoints = [(0.0, 0.0); PERSON_KEYPOINTS];
        for (k, point) in keypoints.iter_mut().enumerate() {
            let kx = features[4 + k * 2] / target_input + anchor[0];
            let ky = features[4 + k * 2 + 1] / target_input + anchor[1];
            *point = (kx * scale - pad_bias_x, ky * scale - pad_bias_y);
        }

        candidates.push(PersonRegion {
            bbox: [x1, y1, x2, y2],
            keypoints,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept
        .into_iter()
        .filter_map(|idx| candidates.get(idx).cloned())
        .collect())
}

pub fn pick_primary_region(regions: &[PersonRegion]) -> Option<&PersonRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

fn nms(candidates: &[PersonRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| candidates[*b].score.total_cmp(&candidates[*a].score));

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        for &k in &keep {
            if iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold {
                continue 'outer;
            }
        }
        keep.push(idx);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: usize = 12;

    fn square_letterbox(size: u32) -> LetterboxInfo {
        LetterboxInfo {
            scale: PERSON_INPUT_SIZE as f32 / size as f32,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: size,
            orig_h: size,
        }
    }

    fn empty_outputs() -> (Vec<f32>, Vec<f32>) {
        (
            vec![0.0; NUM_ANCHORS * FEATURES],
            vec![-10.0; NUM_ANCHORS],
        )
    }

    fn decode(boxes: &[f32], scores: &[f32], letterbox: &LetterboxInfo) -> Vec<PersonRegion> {
        decode_person_outputs(
            boxes,
            &[1, NUM_ANCHORS, FEATURES],
            scores,
            &[1, NUM_ANCHORS, 1],
            &generate_anchors(),
            letterbox,
            &PersonDetectorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn low_scores_yield_no_people() {
        let (boxes, scores) = empty_outputs();
        assert!(decode(&boxes, &scores, &square_letterbox(448)).is_empty());
    }

    #[test]
    fn decodes_box_and_keypoints_relative_to_anchor() {
        let anchors = generate_anchors();
        let (mut boxes, mut scores) = empty_outputs();
        let idx = 1568; // first stride 16 anchor
        scores[idx] = 5.0;
        let f = &mut boxes[idx * FEATURES..(idx + 1) * FEATURES];
        f[2] = 56.0; // width, in input pixels
        f[3] = 112.0;
        f[4] = 0.0; // hip centre on the anchor
        f[5] = 0.0;
        f[6] = 0.0; // scale point 28px above
        f[7] = -28.0;

        let people = decode(&boxes, &scores, &square_letterbox(448));
        assert_eq!(people.len(), 1);
        let person = &people[0];
        let (ax, ay) = (anchors[idx][0] * 448.0, anchors[idx][1] * 448.0);
        assert!((person.keypoints[0].0 - ax).abs() < 1e-3);
        assert!((person.keypoints[0].1 - ay).abs() < 1e-3);
        assert!((person.bbox[2] - person.bbox[0] - 112.0).abs() < 1e-3);
        assert!((person.bbox[3] - person.bbox[1] - 224.0).abs() < 1e-3);

        let roi = person.roi().unwrap();
        assert_eq!(roi.center, person.keypoints[0]);
        assert!((roi.side - 56.0 * 2.0 * 1.25).abs() < 1e-3);
        assert!(roi.angle.abs() < 1e-6);
    }

    #[test]
    fn letterbox_padding_is_removed() {
        let (mut boxes, mut scores) = empty_outputs();
        let idx = 0;
        scores[idx] = 5.0;
        boxes[2] = 10.0;
        boxes[3] = 10.0;
        // 448x224 frame: scale 0.5, 56 px of padding top and bottom at input size.
        let letterbox = LetterboxInfo {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 56.0,
            orig_w: 448,
            orig_h: 224,
        };
        let people = decode(&boxes, &scores, &letterbox);
        let anchor = generate_anchors()[idx];
        assert!((people[0].keypoints[0].1 - (anchor[1] * 448.0 - 112.0)).abs() < 1e-3);
    }

    #[test]
    fn overlapping_detections_are_suppressed() {
        let (mut boxes, mut scores) = empty_outputs();
        // Two anchors sharing a cell produce the same box.
        for (idx, score) in [(600usize, 3.0f32), (601, 4.0)] {
            scores[idx] = score;
            boxes[idx * FEATURES + 2] = 40.0;
            boxes[idx * FEATURES + 3] = 40.0;
        }
        let people = decode(&boxes, &scores, &square_letterbox(224));
        assert_eq!(people.len(), 1);
        assert!((people[0].score - sigmoid(4.0)).abs() < 1e-6);
        assert_eq!(pick_primary_region(&people), people.first());
    }

    #[test]
    fn non_finite_outputs_are_skipped() {
        let (mut boxes, mut scores) = empty_outputs();
        scores[10] = f32::NAN;
        boxes[10 * FEATURES + 2] = 40.0;
        boxes[10 * FEATURES + 3] = 40.0;
        scores[20] = 5.0;
        boxes[20 * FEATURES + 2] = f32::NAN;
        boxes[20 * FEATURES + 3] = 40.0;
        scores[900] = 5.0;
        boxes[900 * FEATURES + 2] = 40.0;
        boxes[900 * FEATURES + 3] = 40.0;

        let people = decode(&boxes, &scores, &square_letterbox(224));
        assert_eq!(people.len(), 1);
        assert!(people[0].score.is_finite());
        assert!(people[0].bbox.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let (boxes, scores) = empty_outputs();
        let err = decode_person_outputs(
            &boxes,
            &[1, NUM_ANCHORS, 6],
            &scores,
            &[1, NUM_ANCHORS, 1],
            &generate_anchors(),
            &square_letterbox(224),
            &PersonDetectorConfig::default(),
        );
        assert!(err.is_err());
    }
}
