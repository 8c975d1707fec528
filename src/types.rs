use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub index: usize,
}

/// A single tracked body point. `x`/`y` are normalized to the frame size,
/// `z` is depth on roughly the same scale as `x`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub frame_index: usize,
    pub landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// Per-frame landmark record for one analyzed video.
///
/// Indices are assigned on push, so they are always contiguous from 0 and
/// a frame without a detected subject still occupies its slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSeries {
    frames: Vec<LandmarkFrame>,
}

impl LandmarkSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, landmarks: Vec<Landmark>) -> usize {
        let frame_index = self.frames.len();
        self.frames.push(LandmarkFrame {
            frame_index,
            landmarks,
        });
        frame_index
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[LandmarkFrame] {
        &self.frames
    }

    pub fn get(&self, index: usize) -> Option<&LandmarkFrame> {
        self.frames.get(index)
    }

    pub fn observation_count(&self) -> usize {
        self.frames.iter().map(|f| f.landmarks.len()).sum()
    }

    pub fn detected_frames(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_empty()).count()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Json, OutputFormat::Csv];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: Option<u64>,
}

/// Files produced by one run, sharing a generation stamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputArtifact {
    pub stamp: String,
    pub data_path: PathBuf,
    pub video_path: PathBuf,
    pub format: OutputFormat,
    pub frame_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(v: f32) -> Landmark {
        Landmark {
            x: v,
            y: v,
            z: 0.0,
            visibility: 1.0,
        }
    }

    #[test]
    fn push_assigns_contiguous_indices_and_keeps_empty_frames() {
        let mut series = LandmarkSeries::default();
        assert_eq!(series.push(vec![point(0.1), point(0.2)]), 0);
        assert_eq!(series.push(Vec::new()), 1);
        assert_eq!(series.push(vec![point(0.3)]), 2);

        assert_eq!(series.len(), 3);
        let indices: Vec<usize> = series.frames().iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(series.get(1).is_some_and(LandmarkFrame::is_empty));
        assert_eq!(series.observation_count(), 3);
        assert_eq!(series.detected_frames(), 2);
    }

    #[test]
    fn series_serializes_as_plain_frame_array() {
        let mut series = LandmarkSeries::default();
        series.push(vec![point(0.5)]);
        series.push(Vec::new());

        let value = serde_json::to_value(&series).unwrap();
        let frames = value.as_array().expect("series should be a JSON array");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["frame_index"], 0);
        assert_eq!(frames[0]["landmarks"][0]["visibility"], 1.0);
        assert_eq!(frames[1]["landmarks"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn output_format_extension_and_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
        assert_eq!(OutputFormat::Csv.extension(), "csv");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        let parsed: OutputFormat = serde_json::from_str("\"csv\"").unwrap();
        assert_eq!(parsed, OutputFormat::Csv);
    }
}
