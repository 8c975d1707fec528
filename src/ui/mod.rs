use std::{mem, path::PathBuf, sync::Arc, thread};

use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use futures::channel::oneshot;
use gpui::prelude::FluentBuilder;
use gpui::{
    AnyElement, App, AppContext, Context, Hsla, InteractiveElement, IntoElement, ObjectFit,
    ParentElement, PathPromptOptions, Render, RenderImage, SharedString, Styled, StyledImage,
    TitlebarOptions, Window, WindowControlArea, WindowDecorations, WindowOptions, div, img, px,
};
use gpui_component::{
    ActiveTheme, Root, Selectable, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::AppConfig,
    model_download::{ModelDownloadEvent, ModelKind},
    pipeline::{
        EstimatorBackend, PlaybackStream, RunEvent, playback::PlaybackEvent, spawn_run,
        start_playback,
    },
    types::{Frame, OutputFormat},
    video::VideoTools,
};

mod download;
mod main_view;
mod render_util;
mod state;
mod titlebar;

use state::{MainState, UiEvent};

pub const WINDOW_TITLE: &str = "動画ボーン解析ツール";

type PathPick = oneshot::Receiver<anyhow::Result<Option<Vec<PathBuf>>>>;

pub fn launch_ui(app: &mut App, config: AppConfig, tools_available: bool) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some(WINDOW_TITLE.into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_decorations: Some(WindowDecorations::Client),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config, tools_available));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    config: AppConfig,
    tools: VideoTools,
    tools_available: bool,
    state: MainState,
    run: Option<ActiveRun>,
    pending_pick: Option<PathPick>,
    playback: Option<PlaybackStream>,
    playback_ended: bool,
    latest_image: Option<Arc<RenderImage>>,
    frame_size: Option<(u32, u32)>,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
}

struct ActiveRun {
    events: Receiver<RunEvent>,
    handle: thread::JoinHandle<()>,
}

enum Screen {
    Download(DownloadState),
    Main,
}

struct DownloadState {
    current: Option<ModelKind>,
    downloaded: u64,
    total: Option<u64>,
    ready: Vec<ModelKind>,
    message: String,
    error: Option<String>,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            current: None,
            downloaded: 0,
            total: None,
            ready: Vec::new(),
            message: "モデルを確認しています...".to_string(),
            error: None,
        }
    }

    fn finished(&self) -> bool {
        self.error.is_none() && ModelKind::ALL.iter().all(|m| self.ready.contains(m))
    }
}

enum DownloadMessage {
    Event(ModelDownloadEvent),
    Error(String),
}

impl AppView {
    fn new(config: AppConfig, tools_available: bool) -> Self {
        let (download_tx, download_rx) = unbounded();
        let backend = EstimatorBackend::from_config(&config);
        if !backend.models_present() {
            log::info!("pose models missing, downloading into {}", config.model_dir.display());
        }
        let download_handle = download::spawn_model_download(backend, download_tx);
        let tools = VideoTools::from_config(&config);

        Self {
            screen: Screen::Download(DownloadState::new()),
            config,
            tools,
            tools_available,
            state: MainState::default(),
            run: None,
            pending_pick: None,
            playback: None,
            playback_ended: false,
            latest_image: None,
            frame_size: None,
            download_rx,
            _download_handle: download_handle,
        }
    }

    fn dispatch(&mut self, event: UiEvent, window: &mut Window, cx: &mut Context<'_, Self>) {
        log::debug!("ui event {event:?}");
        match event {
            UiEvent::PickVideo => {
                if self.pending_pick.is_none() && !self.state.is_running() {
                    self.pending_pick = Some(cx.prompt_for_paths(PathPromptOptions {
                        files: true,
                        directories: false,
                        multiple: false,
                        prompt: None,
                    }));
                }
            }
            UiEvent::SelectFormat(format) => {
                if !self.state.is_running() {
                    self.state.select_format(format);
                }
            }
            UiEvent::Analyze => self.start_run(),
            UiEvent::Reset => {
                if self.state.reset() {
                    self.stop_playback(window, cx);
                }
            }
            UiEvent::Replay => self.start_playback(window, cx),
            UiEvent::RevealData => {
                if let Some(path) = &self.state.download {
                    cx.reveal_path(path);
                }
            }
            UiEvent::OpenData => {
                if let Some(path) = &self.state.download {
                    cx.open_with_system(path);
                }
            }
        }
        cx.notify();
    }

    fn start_run(&mut self) {
        let Some(request) = self.state.begin_run() else {
            log::info!("analysis already running, ignoring request");
            return;
        };
        let (events, handle) = spawn_run(request, self.config.clone());
        self.run = Some(ActiveRun { events, handle });
    }

    fn poll_run(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let Some(run) = self.run.as_ref() else {
            return;
        };

        let mut finished = None;
        loop {
            match run.events.try_recv() {
                Ok(RunEvent::Stage(stage)) => self.state.advance(stage),
                Ok(RunEvent::Finished(result)) => {
                    finished = Some(result);
                    break;
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if let Some(run) = self.run.take() {
            let _ = run.handle.join();
        }
        match finished {
            Some(result) => {
                self.state.finish_run(&result);
                self.start_playback(window, cx);
            }
            None => self.state.abandon_run(),
        }
    }

    fn poll_pick(&mut self) {
        let Some(pick) = self.pending_pick.as_mut() else {
            return;
        };
        match pick.try_recv() {
            Ok(None) => {}
            Ok(Some(Ok(Some(paths)))) => {
                if let Some(path) = paths.into_iter().next() {
                    self.state.select_video(path);
                }
                self.pending_pick = None;
            }
            Ok(Some(Ok(None))) => self.pending_pick = None,
            Ok(Some(Err(err))) => {
                log::warn!("file dialog failed: {err:#}");
                self.pending_pick = None;
            }
            Err(_canceled) => self.pending_pick = None,
        }
    }

    fn start_playback(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        self.stop_playback(window, cx);
        let Some(path) = self.state.playback.clone() else {
            return;
        };
        match start_playback(&self.tools, &path) {
            Ok(stream) => self.playback = Some(stream),
            Err(err) => {
                log::error!("failed to play {}: {err}", path.display());
                self.playback_ended = true;
            }
        }
    }

    fn stop_playback(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if let Some(stream) = self.playback.take() {
            stream.stop();
        }
        self.playback_ended = false;
        self.frame_size = None;
        if let Some(old_image) = self.latest_image.take() {
            cx.drop_image(old_image, Some(window));
        }
    }

    fn poll_playback(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let Some(stream) = self.playback.as_ref() else {
            return;
        };

        let mut latest: Option<Frame> = None;
        let mut ended = false;
        while let Ok(event) = stream.events().try_recv() {
            match event {
                PlaybackEvent::Frame(frame) => latest = Some(frame),
                PlaybackEvent::Ended { frames } => {
                    log::debug!("playback finished after {frames} frames");
                    ended = true;
                }
                PlaybackEvent::Failed(reason) => {
                    log::warn!("playback stopped: {reason}");
                    ended = true;
                }
            }
        }

        if let Some(frame) = latest {
            self.frame_size = Some((frame.width, frame.height));
            if let Some(image) = render_util::frame_to_image(&frame) {
                self.replace_latest_image(image, window, cx);
            }
        }
        if ended {
            if let Some(stream) = self.playback.take() {
                stream.stop();
            }
            self.playback_ended = true;
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Release the previous texture, the sprite atlas would keep every frame.
            cx.drop_image(old_image, Some(window));
        }
    }
}

impl Render for AppView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let mut screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match screen {
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                let view = self.render_download_view(&state, cx);
                if state.finished() {
                    screen = Screen::Main;
                } else {
                    screen = Screen::Download(state);
                }
                view
            }
            Screen::Main => {
                screen = Screen::Main;
                self.poll_pick();
                self.poll_run(window, cx);
                self.poll_playback(window, cx);
                self.render_main(window, cx)
            }
        };
        self.screen = screen;
        view
    }
}
