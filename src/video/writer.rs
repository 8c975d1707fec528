use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    thread,
};

use super::{FrameSink, VideoTools, collect_stderr, drain_stderr, tool_error};
use crate::{
    error::{PipelineError, PipelineResult},
    types::Frame,
};

/// Encodes RGBA frames into a video file through an `ffmpeg` child process.
pub struct VideoWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<thread::JoinHandle<String>>,
    frames_written: usize,
}

impl VideoWriter {
    pub fn create(
        tools: &VideoTools,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        codec: &str,
    ) -> PipelineResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| PipelineError::write(parent, err))?;
        }

        let mut child = Command::new(&tools.ffmpeg)
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgba", "-s"])
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps:.6}"))
            .args(["-i", "-", "-an", "-c:v", codec, "-q:v", "3"])
            // yuv420p needs even dimensions; pad by at most one pixel.
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| tool_error(&tools.ffmpeg, err))?;

        let stdin = child.stdin.take();
        let stderr = drain_stderr(child.stderr.take());

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            child,
            stdin,
            stderr,
            frames_written: 0,
        })
    }

    /// Closes the encoder input and waits for ffmpeg to finalize the file.
    pub fn finish(mut self) -> PipelineResult<usize> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|err| PipelineError::write(&self.path, err))?;
        let stderr = collect_stderr(self.stderr.take());
        if !status.success() {
            return Err(PipelineError::write_msg(
                &self.path,
                format!("ffmpeg exited with {status}: {stderr}"),
            ));
        }
        log::debug!(
            "encoded {} frames into {}",
            self.frames_written,
            self.path.display()
        );
        Ok(self.frames_written)
    }

    fn fail_with_encoder_output(&mut self, err: io::Error) -> PipelineError {
        drop(self.stdin.take());
        let _ = self.child.wait();
        let stderr = collect_stderr(self.stderr.take());
        if stderr.is_empty() {
            PipelineError::write(&self.path, err)
        } else {
            PipelineError::write_msg(&self.path, format!("{err}: {stderr}"))
        }
    }
}

impl FrameSink for VideoWriter {
    fn write_frame(&mut self, frame: &Frame) -> PipelineResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(PipelineError::write_msg(
                &self.path,
                format!(
                    "frame {} is {}x{}, encoder expects {}x{}",
                    frame.index, frame.width, frame.height, self.width, self.height
                ),
            ));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(PipelineError::write_msg(&self.path, "encoder input already closed"));
        };
        if let Err(err) = stdin.write_all(&frame.rgba) {
            return Err(self.fail_with_encoder_output(err));
        }
        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
