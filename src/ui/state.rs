use std::path::PathBuf;

use crate::{
    error::PipelineResult,
    pipeline::{RunRequest, RunStage, present},
    types::{OutputArtifact, OutputFormat},
};

/// Buttons on the main screen. Every click goes through `AppView::dispatch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UiEvent {
    PickVideo,
    SelectFormat(OutputFormat),
    Analyze,
    Reset,
    Replay,
    RevealData,
    OpenData,
}

/// Form and result state of the main screen, independent of the window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct MainState {
    pub video: Option<PathBuf>,
    pub format: OutputFormat,
    pub status: String,
    pub status_is_error: bool,
    pub running: Option<RunStage>,
    pub playback: Option<PathBuf>,
    pub download: Option<PathBuf>,
}

impl MainState {
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn select_video(&mut self, path: PathBuf) {
        log::info!("selected {}", path.display());
        self.video = Some(path);
    }

    pub fn select_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    /// Back to the initial form: no video, json, empty status, no results.
    /// Ignored while a run is in flight.
    pub fn reset(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        *self = Self::default();
        true
    }

    /// Marks a run as started and returns its request, or `None` when one is
    /// already in flight.
    pub fn begin_run(&mut self) -> Option<RunRequest> {
        if self.is_running() {
            return None;
        }
        self.running = Some(RunStage::LoadingModels);
        self.status = RunStage::LoadingModels.label().to_string();
        self.status_is_error = false;
        self.playback = None;
        self.download = None;
        Some(RunRequest {
            video: self.video.clone(),
            format: self.format,
        })
    }

    pub fn advance(&mut self, stage: RunStage) {
        if self.is_running() {
            self.running = Some(stage);
            self.status = stage.label().to_string();
        }
    }

    pub fn finish_run(&mut self, result: &PipelineResult<OutputArtifact>) {
        let presentation = present(result);
        self.running = None;
        self.status = presentation.status;
        self.status_is_error = presentation.is_error;
        self.playback = presentation.playback;
        self.download = presentation.download;
    }

    /// The worker went away without reporting a result.
    pub fn abandon_run(&mut self) {
        self.running = None;
        self.status = "予期せぬエラーが発生しました: 解析スレッドが終了しました".to_string();
        self.status_is_error = true;
    }

    pub fn video_label(&self) -> String {
        file_label(self.video.as_ref())
    }

    pub fn download_label(&self) -> String {
        file_label(self.download.as_ref())
    }
}

fn file_label(path: Option<&PathBuf>) -> String {
    path.and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "未選択".to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{error::PipelineError, pipeline::presenter::MSG_MISSING_UPLOAD};

    #[test]
    fn one_run_at_a_time() {
        let mut state = MainState::default();
        state.select_video(PathBuf::from("/videos/dance.mp4"));
        state.select_format(OutputFormat::Csv);

        let request = state.begin_run().unwrap();
        assert_eq!(request.video, Some(PathBuf::from("/videos/dance.mp4")));
        assert_eq!(request.format, OutputFormat::Csv);
        assert!(state.begin_run().is_none());
        assert!(!state.reset());

        state.advance(RunStage::Rendering);
        assert_eq!(state.status, RunStage::Rendering.label());
    }

    #[test]
    fn finished_run_exposes_results_and_reset_clears_them() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let data_path = dir.path().join("20240309_140507.json");
        let video_path = dir.path().join("20240309_140507.mp4");
        fs::write(&data_path, "[]").unwrap();
        fs::write(&video_path, b"").unwrap();

        let mut state = MainState::default();
        state.select_video(dir.path().join("in.mp4"));
        state.begin_run();
        state.finish_run(&Ok(OutputArtifact {
            stamp: "20240309_140507".to_string(),
            data_path: data_path.clone(),
            video_path: video_path.clone(),
            format: OutputFormat::Json,
            frame_count: 3,
        }));

        assert!(!state.is_running());
        assert!(!state.status_is_error);
        assert_eq!(state.playback, Some(video_path));
        assert_eq!(state.download, Some(data_path));
        assert_eq!(state.download_label(), "20240309_140507.json");

        assert!(state.reset());
        assert_eq!(state, MainState::default());
        assert_eq!(state.format, OutputFormat::Json);
        assert_eq!(state.video_label(), "未選択");
    }

    #[test]
    fn failures_show_the_error_message() {
        let mut state = MainState::default();
        state.begin_run();
        state.finish_run(&Err(PipelineError::MissingUpload));
        assert!(state.status_is_error);
        assert_eq!(state.status, MSG_MISSING_UPLOAD);
        assert_eq!((state.playback.as_ref(), state.download.as_ref()), (None, None));
    }
}
