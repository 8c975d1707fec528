use std::{
    ffi::OsString,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    thread,
};

use super::{
    VideoTools, collect_stderr, drain_stderr, probe, tool_error,
    yuv_converter::{self, RawLayout},
};
use crate::{
    error::{PipelineError, PipelineResult},
    types::{Frame, VideoInfo},
};

/// Streams decoded RGBA frames out of an `ffmpeg` child process.
pub struct VideoReader {
    path: PathBuf,
    info: VideoInfo,
    layout: RawLayout,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<thread::JoinHandle<String>>,
    next_index: usize,
    finished: bool,
}

impl VideoReader {
    pub fn open(tools: &VideoTools, path: &Path) -> PipelineResult<Self> {
        let info = probe(tools, path)?;
        let layout = RawLayout::for_size(info.width, info.height);

        let mut child = Command::new(&tools.ffmpeg)
            .args(decode_args(path, layout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| tool_error(&tools.ffmpeg, err))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::decode(path, "ffmpeg stdout was not captured"))?;
        let stderr = drain_stderr(child.stderr.take());

        log::debug!(
            "decoding {} ({}x{} @ {:.2} fps, {:?})",
            path.display(),
            info.width,
            info.height,
            info.fps,
            layout
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            layout,
            child,
            stdout: BufReader::new(stdout),
            stderr,
            next_index: 0,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn finish(&mut self) -> PipelineResult<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|err| PipelineError::decode(&self.path, format!("failed to wait for ffmpeg: {err}")))?;
        let stderr = collect_stderr(self.stderr.take());
        if status.success() {
            if !stderr.is_empty() {
                log::debug!("ffmpeg reported while decoding {}: {stderr}", self.path.display());
            }
            Ok(())
        } else {
            Err(PipelineError::decode(
                &self.path,
                format!("ffmpeg exited with {status}: {stderr}"),
            ))
        }
    }

    fn abort(&mut self) {
        self.finished = true;
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = collect_stderr(self.stderr.take());
    }
}

impl Iterator for VideoReader {
    type Item = PipelineResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let (width, height) = (self.info.width, self.info.height);
        let mut buffer = vec![0u8; self.layout.frame_len(width, height)];
        match read_full(&mut self.stdout, &mut buffer) {
            Ok(n) if n == buffer.len() => {}
            Ok(n) => {
                if n > 0 {
                    log::warn!(
                        "dropping truncated trailing frame ({n} of {} bytes) in {}",
                        buffer.len(),
                        self.path.display()
                    );
                }
                return self.finish().err().map(Err);
            }
            Err(err) => {
                self.abort();
                return Some(Err(PipelineError::decode(
                    &self.path,
                    format!("failed reading decoded frames: {err}"),
                )));
            }
        }

        match yuv_converter::convert_raw_frame(self.layout, buffer, width, height) {
            Ok(rgba) => {
                let frame = Frame {
                    rgba,
                    width,
                    height,
                    index: self.next_index,
                };
                self.next_index += 1;
                Some(Ok(frame))
            }
            Err(err) => {
                self.abort();
                Some(Err(PipelineError::decode(&self.path, format!("{err:#}"))))
            }
        }
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}

/// Like `read_exact`, but reports how much was read when the stream ends early.
/// One raw frame out per decoded frame: no frame-rate conversion, display
/// rotation applied (matching what `probe` reports).
fn decode_args(path: &Path, layout: RawLayout) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-i"].map(OsString::from).into();
    args.push(path.as_os_str().to_owned());
    args.extend(
        [
            "-map",
            "0:v:0",
            "-an",
            "-fps_mode",
            "passthrough",
            "-f",
            "rawvideo",
            "-pix_fmt",
            layout.pix_fmt(),
            "-",
        ]
        .map(OsString::from),
    );
    args
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::test_support::synthetic_clip;

    #[test]
    fn read_full_reports_short_reads() {
        let data = [1u8, 2, 3];
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut &data[..], &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &data);

        let mut exact = [0u8; 2];
        assert_eq!(read_full(&mut &data[..], &mut exact).unwrap(), 2);
    }

    #[test]
    #[ignore] // Needs ffmpeg and ffprobe on PATH.
    fn decodes_every_frame_with_contiguous_indices() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let (tools, clip) = synthetic_clip(dir.path(), "clip.mp4", 64, 48, 7);

        let reader = VideoReader::open(&tools, &clip).unwrap();
        assert_eq!((reader.info().width, reader.info().height), (64, 48));
        let frames: Vec<Frame> = reader.collect::<PipelineResult<_>>().unwrap();

        assert_eq!(frames.len(), 7);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.rgba.len(), 64 * 48 * 4);
        }
    }

    #[test]
    fn decoder_keeps_every_source_frame() {
        let args = decode_args(Path::new("clip.mp4"), RawLayout::I420);
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();

        let mode = args.iter().position(|a| *a == "-fps_mode").unwrap();
        assert_eq!(args[mode + 1], "passthrough");
        assert!(!args.contains(&"-noautorotate"));
        assert_eq!(args.last(), Some(&"-"));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
    }

    #[cfg(unix)]
    #[test]
    fn reads_exactly_the_frames_the_decoder_emits() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let tools = crate::video::test_support::tools_without_encoder(dir.path(), 4, 2, 5);

        let frames: Vec<Frame> = VideoReader::open(&tools, Path::new("clip.mp4"))
            .unwrap()
            .collect::<PipelineResult<_>>()
            .unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[4].index, 4);
        assert_eq!(frames[0].rgba.len(), 4 * 2 * 4);
    }

    #[test]
    fn missing_ffmpeg_binary_is_a_tool_error() {
        let tools = VideoTools {
            ffmpeg: PathBuf::from("definitely-not-ffmpeg-7f3a"),
            ffprobe: PathBuf::from("definitely-not-ffprobe-7f3a"),
        };
        let err = VideoReader::open(&tools, Path::new("clip.mp4")).err().unwrap();
        assert!(matches!(err, PipelineError::Tool { .. }), "{err:?}");
    }
}
