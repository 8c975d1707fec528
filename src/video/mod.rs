//! Video decoding and encoding through the `ffmpeg`/`ffprobe` command line
//! tools. Frames cross the process boundary as raw buffers on pipes.

pub mod probe;
pub mod reader;
pub mod writer;
pub mod yuv_converter;

use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::{ChildStderr, Command, Stdio},
    thread,
};

use crate::{config::AppConfig, error::PipelineError, types::Frame};

pub use probe::probe;
pub use reader::VideoReader;
pub use writer::VideoWriter;

#[derive(Clone, Debug)]
pub struct VideoTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl VideoTools {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        }
    }

    /// Both binaries answer `-version`.
    pub fn available(&self) -> bool {
        tool_responds(&self.ffmpeg) && tool_responds(&self.ffprobe)
    }
}

impl Default for VideoTools {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Destination for rendered frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError>;
}

fn tool_responds(bin: &Path) -> bool {
    Command::new(bin)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub(crate) fn tool_error(tool: &Path, source: io::Error) -> PipelineError {
    PipelineError::Tool {
        tool: tool.display().to_string(),
        source,
    }
}

pub(crate) fn drain_stderr(stderr: Option<ChildStderr>) -> Option<thread::JoinHandle<String>> {
    let mut stderr = stderr?;
    Some(thread::spawn(move || {
        let mut out = String::new();
        let _ = stderr.read_to_string(&mut out);
        out
    }))
}

pub(crate) fn collect_stderr(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
