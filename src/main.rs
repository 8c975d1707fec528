#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod error;
mod model_download;
mod pipeline;
mod types;
mod ui;
mod video;

use anyhow::Result;
use gpui::Application;

use config::AppConfig;
use video::VideoTools;

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::load();
    let tools_available = VideoTools::from_config(&config).available();
    if !tools_available {
        log::warn!(
            "{} / {} not found; install ffmpeg or set BONE_ANALYZER_FFMPEG and BONE_ANALYZER_FFPROBE",
            config.ffmpeg.display(),
            config.ffprobe.display()
        );
    }
    log::info!(
        "writing results under {}, models in {}",
        config.output_dir.display(),
        config.model_dir.display()
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config.clone(), tools_available) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
