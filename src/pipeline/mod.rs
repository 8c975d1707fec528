pub mod analyzer;
pub mod estimator;
pub mod playback;
pub mod presenter;
pub mod serializer;
pub mod skeleton;
pub mod visualizer;

use std::{path::PathBuf, thread};

use chrono::Local;
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{
    config::AppConfig,
    error::{PipelineError, PipelineResult},
    types::{OutputArtifact, OutputFormat},
    video::VideoTools,
};

pub use estimator::{EstimatorBackend, PoseEngine};
pub use playback::{PlaybackStream, start_playback};
pub use presenter::{Presentation, present};

/// Inputs for one analysis run.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub video: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Everything a run needs besides its request; built fresh for every run.
pub struct RunContext {
    pub config: AppConfig,
    pub tools: VideoTools,
    pub engine: Box<dyn PoseEngine>,
}

impl RunContext {
    pub fn new(config: AppConfig, engine: Box<dyn PoseEngine>) -> Self {
        let tools = VideoTools::from_config(&config);
        Self {
            config,
            tools,
            engine,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    LoadingModels,
    Analyzing,
    Saving,
    Rendering,
}

impl RunStage {
    pub fn label(&self) -> &'static str {
        match self {
            RunStage::LoadingModels => "モデルを読み込み中...",
            RunStage::Analyzing => "動画を解析中...",
            RunStage::Saving => "ランドマークデータを保存中...",
            RunStage::Rendering => "ランドマーク付き動画を作成中...",
        }
    }
}

#[derive(Debug)]
pub enum RunEvent {
    Stage(RunStage),
    Finished(PipelineResult<OutputArtifact>),
}

/// Upload → analyze → serialize → visualize. Nothing is written unless the
/// video decodes to at least one frame. A visualization failure still returns
/// the artifact; its video path is then absent on disk.
pub fn run<F>(request: &RunRequest, ctx: &mut RunContext, mut on_stage: F) -> PipelineResult<OutputArtifact>
where
    F: FnMut(RunStage),
{
    let video = request.video.as_ref().ok_or(PipelineError::MissingUpload)?;
    if !video.is_file() {
        return Err(PipelineError::InvalidUpload {
            path: video.clone(),
        });
    }
    log::info!(
        "starting analysis of {} ({} output)",
        video.display(),
        request.format
    );

    on_stage(RunStage::Analyzing);
    let series = analyzer::analyze_video(&ctx.tools, video, ctx.engine.as_mut())?;

    on_stage(RunStage::Saving);
    let layout = serializer::OutputLayout::from_config(&ctx.config);
    let reserved = layout.reserve(Local::now(), request.format)?;
    serializer::write_series(&series, request.format, &reserved.data_path)?;

    on_stage(RunStage::Rendering);
    let options = visualizer::OverlayOptions {
        codec: ctx.config.video_codec.clone(),
        visibility_threshold: ctx.config.visibility_threshold,
    };
    // The landmark data is already on disk; a failed render only costs the
    // video, which the presenter reports as missing.
    match visualizer::visualize(&ctx.tools, video, &series, &reserved.video_path, &options) {
        Ok(written) if written != series.len() => log::warn!(
            "visualized {written} frames but analyzed {}; the source decoded differently the second time",
            series.len()
        ),
        Ok(_) => {}
        Err(err) => log::error!("visualization of {} failed: {err}", video.display()),
    }

    log::info!(
        "run {} finished: {} frames, data {}, video {}",
        reserved.stamp,
        series.len(),
        reserved.data_path.display(),
        reserved.video_path.display()
    );
    Ok(OutputArtifact {
        stamp: reserved.stamp,
        data_path: reserved.data_path,
        video_path: reserved.video_path,
        format: request.format,
        frame_count: series.len(),
    })
}

/// Runs `request` on a worker thread with a freshly loaded engine and reports
/// stages and the final result over the returned channel.
pub fn spawn_run(request: RunRequest, config: AppConfig) -> (Receiver<RunEvent>, thread::JoinHandle<()>) {
    let (event_tx, event_rx) = unbounded();
    let handle = thread::spawn(move || {
        let result = run_with_fresh_engine(&request, config, &event_tx);
        match &result {
            Err(err) if err.is_input_error() => log::warn!("analysis rejected: {err}"),
            Err(err) => log::error!("analysis failed: {err}"),
            Ok(_) => {}
        }
        let _ = event_tx.send(RunEvent::Finished(result));
    });
    (event_rx, handle)
}

fn run_with_fresh_engine(
    request: &RunRequest,
    config: AppConfig,
    event_tx: &Sender<RunEvent>,
) -> PipelineResult<OutputArtifact> {
    // Input problems are reported before paying for model loading.
    let video = request.video.as_ref().ok_or(PipelineError::MissingUpload)?;
    if !video.is_file() {
        return Err(PipelineError::InvalidUpload {
            path: video.clone(),
        });
    }

    let _ = event_tx.send(RunEvent::Stage(RunStage::LoadingModels));
    let engine = EstimatorBackend::from_config(&config).load()?;
    let mut ctx = RunContext::new(config, Box::new(engine));
    run(request, &mut ctx, |stage| {
        let _ = event_tx.send(RunEvent::Stage(stage));
    })
}
