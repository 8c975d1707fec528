use std::{path::Path, process::Command};

use serde::Deserialize;

use super::{VideoTools, tool_error};
use crate::{
    error::{PipelineError, PipelineResult},
    types::VideoInfo,
};

pub const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_frames: Option<String>,
    #[serde(default)]
    tags: StreamTags,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees. The display matrix wins over the legacy
    /// `rotate` tag.
    fn rotation(&self) -> f64 {
        self.side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0)
    }
}

pub fn probe(tools: &VideoTools, path: &Path) -> PipelineResult<VideoInfo> {
    let output = Command::new(&tools.ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_streams",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|err| tool_error(&tools.ffprobe, err))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::decode(
            path,
            format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    parse_probe_output(&output.stdout).map_err(|reason| PipelineError::decode(path, reason))
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo, String> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|err| format!("unreadable ffprobe output: {err}"))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        (w, h) => return Err(format!("invalid frame size {w:?}x{h:?}")),
    };
    // ffmpeg applies the display rotation while decoding, so quarter turns
    // arrive with width and height swapped.
    let quarter_turn = (stream.rotation().round() as i64).rem_euclid(180) == 90;
    let (width, height) = if quarter_turn { (height, width) } else { (width, height) };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(FALLBACK_FPS);

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
    })
}

/// Parses ffprobe rationals such as `30000/1001`; `0/0` yields `None`.
fn parse_rate(raw: &str) -> Option<f64> {
    let (num, den) = match raw.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (raw.trim().parse::<f64>().ok()?, 1.0),
    };
    if den <= 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Decodes the whole first video stream and counts its frames.
#[cfg(test)]
pub(crate) fn count_frames(tools: &VideoTools, path: &Path) -> Option<u64> {
    let output = Command::new(&tools.ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_frames",
            "-show_entries",
            "stream=nb_read_frames",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .ok()?;
    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout).ok()?;
    parsed
        .streams
        .into_iter()
        .next()?
        .nb_read_frames?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_fields() {
        let json = br#"{
            "programs": [],
            "streams": [{
                "width": 640,
                "height": 360,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30/1",
                "nb_frames": "120"
            }]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.frame_count, Some(120));
    }

    #[test]
    fn falls_back_when_rates_are_unknown() {
        let json = br#"{"streams": [{"width": 2, "height": 2, "avg_frame_rate": "0/0", "r_frame_rate": "0/0"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, FALLBACK_FPS);
        assert_eq!(info.frame_count, None);

        let json = br#"{"streams": [{"width": 2, "height": 2, "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}]}"#;
        assert_eq!(parse_probe_output(json).unwrap().fps, 25.0);
    }

    #[test]
    fn portrait_phone_clip_reports_display_size() {
        let json = br#"{
            "streams": [{
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30/1",
                "side_data_list": [{
                    "side_data_type": "Display Matrix",
                    "displaymatrix": "...",
                    "rotation": -90
                }]
            }]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let json = br#"{"streams": [{"width": 640, "height": 480, "tags": {"rotate": "270"}}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (480, 640));

        let json = br#"{"streams": [{"width": 640, "height": 480, "side_data_list": [{"rotation": 180}]}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (640, 480));
    }

    #[test]
    fn rejects_missing_video_stream() {
        assert!(parse_probe_output(br#"{}"#).is_err());
        assert!(parse_probe_output(br#"{"streams": []}"#).is_err());
        assert!(parse_probe_output(br#"{"streams": [{"width": 0, "height": 10}]}"#).is_err());
        assert!(parse_probe_output(b"garbage").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn non_video_file_is_a_decode_error() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let tools = crate::video::test_support::rejecting_tools(dir.path());
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, "this is not a video").unwrap();

        let err = probe(&tools, &path).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }), "{err:?}");
    }
}
