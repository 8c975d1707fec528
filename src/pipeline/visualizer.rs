use std::{fs, path::Path};

use super::skeleton::draw_pose;
use crate::{
    error::PipelineResult,
    types::{Frame, LandmarkSeries},
    video::{FrameSink, VideoReader, VideoTools, VideoWriter},
};

#[derive(Clone, Debug)]
pub struct OverlayOptions {
    pub codec: String,
    pub visibility_threshold: f32,
}

/// Re-decodes `source`, draws each frame's landmarks and encodes the result to
/// `output` at the source frame rate. Returns the number of frames written.
pub fn visualize(
    tools: &VideoTools,
    source: &Path,
    series: &LandmarkSeries,
    output: &Path,
    options: &OverlayOptions,
) -> PipelineResult<usize> {
    let reader = VideoReader::open(tools, source)?;
    let info = *reader.info();
    let mut writer = VideoWriter::create(
        tools,
        output,
        info.width,
        info.height,
        info.fps,
        &options.codec,
    )?;

    let result = match render_overlay(reader, series, &mut writer, options.visibility_threshold) {
        Ok(_) => writer.finish(),
        Err(err) => {
            // Stop the encoder before deleting its output.
            drop(writer);
            Err(err)
        }
    };
    match result {
        Ok(frames) => {
            log::info!("visualized {frames} frames into {}", output.display());
            Ok(frames)
        }
        Err(err) => {
            if output.exists() {
                if let Err(rm_err) = fs::remove_file(output) {
                    log::warn!("could not remove partial {}: {rm_err}", output.display());
                }
            }
            Err(err)
        }
    }
}

/// Draws `series` over `frames` and hands every frame to `sink`, annotated or
/// not, so the output keeps the source frame count.
pub fn render_overlay<I, S>(
    frames: I,
    series: &LandmarkSeries,
    sink: &mut S,
    visibility_threshold: f32,
) -> PipelineResult<usize>
where
    I: IntoIterator<Item = PipelineResult<Frame>>,
    S: FrameSink + ?Sized,
{
    let mut written = 0;
    for frame in frames {
        let mut frame = frame?;
        match series.get(frame.index) {
            Some(entry) => draw_pose(
                &mut frame.rgba,
                frame.width,
                frame.height,
                &entry.landmarks,
                visibility_threshold,
            ),
            None => log::debug!("no landmark entry for frame {}", frame.index),
        }
        sink.write_frame(&frame)?;
        written += 1;
    }
    Ok(written)
}
