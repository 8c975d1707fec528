use std::path::Path;

use super::estimator::PoseEngine;
use crate::{
    error::{PipelineError, PipelineResult},
    types::{Frame, LandmarkSeries},
    video::{VideoReader, VideoTools},
};

/// Decodes `path` and runs every frame through `engine`.
pub fn analyze_video<E>(tools: &VideoTools, path: &Path, engine: &mut E) -> PipelineResult<LandmarkSeries>
where
    E: PoseEngine + ?Sized,
{
    let reader = VideoReader::open(tools, path)?;
    let capacity = reader
        .info()
        .frame_count
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let series = analyze_frames(reader, engine, capacity)?;
    if series.is_empty() {
        return Err(PipelineError::EmptyVideo {
            path: path.to_path_buf(),
        });
    }
    Ok(series)
}

/// One series entry per decoded frame, in decode order. Frames where the
/// engine finds nothing, or fails, are kept as empty entries.
pub fn analyze_frames<I, E>(frames: I, engine: &mut E, capacity: usize) -> PipelineResult<LandmarkSeries>
where
    I: IntoIterator<Item = PipelineResult<Frame>>,
    E: PoseEngine + ?Sized,
{
    engine.reset();
    let mut series = LandmarkSeries::with_capacity(capacity);
    for frame in frames {
        let frame = frame?;
        let landmarks = match engine.infer(&frame) {
            Ok(output) => output.landmarks,
            Err(err) => {
                log::warn!("pose inference failed on frame {}: {err:?}", frame.index);
                Vec::new()
            }
        };
        series.push(landmarks);
    }

    log::info!(
        "analyzed {} frames, pose found in {}",
        series.len(),
        series.detected_frames()
    );
    Ok(series)
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::anyhow;

    use crate::{
        pipeline::estimator::{PoseEngine, PoseOutput},
        types::{Frame, Landmark},
    };

    /// What the scripted engine reports for a frame index.
    #[derive(Clone, Copy, Debug)]
    pub enum Step {
        Pose,
        Nothing,
        Fail,
    }

    /// Plays back a fixed script, repeating the last step once it runs out.
    pub struct ScriptedEngine {
        pub script: Vec<Step>,
        pub calls: usize,
        pub resets: usize,
    }

    impl ScriptedEngine {
        pub fn new(script: Vec<Step>) -> Self {
            Self {
                script,
                calls: 0,
                resets: 0,
            }
        }

        pub fn always_pose() -> Self {
            Self::new(vec![Step::Pose])
        }
    }

    pub fn standing_pose() -> Vec<Landmark> {
        (0..33)
            .map(|i| Landmark {
                x: 0.3 + 0.4 * (i % 2) as f32,
                y: 0.1 + 0.025 * i as f32,
                z: -0.05,
                visibility: 0.9,
            })
            .collect()
    }

    impl PoseEngine for ScriptedEngine {
        fn infer(&mut self, frame: &Frame) -> anyhow::Result<PoseOutput> {
            self.calls += 1;
            let step = self
                .script
                .get(frame.index)
                .or(self.script.last())
                .copied()
                .unwrap_or(Step::Nothing);
            match step {
                Step::Pose => Ok(PoseOutput {
                    landmarks: standing_pose(),
                    confidence: 0.9,
                }),
                Step::Nothing => Ok(PoseOutput::default()),
                Step::Fail => Err(anyhow!("scripted failure")),
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }
}
