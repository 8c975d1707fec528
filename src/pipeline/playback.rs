use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};

use crate::{
    error::PipelineResult,
    types::{Frame, VideoInfo},
    video::{VideoReader, VideoTools},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum PlaybackEvent {
    Frame(Frame),
    Ended { frames: usize },
    Failed(String),
}

/// Decodes a video on a background thread and hands frames out at the
/// video's own frame rate.
#[derive(Debug)]
pub struct PlaybackStream {
    info: VideoInfo,
    events: Receiver<PlaybackEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PlaybackStream {
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn events(&self) -> &Receiver<PlaybackEvent> {
        &self.events
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PlaybackStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn start_playback(tools: &VideoTools, path: &Path) -> PipelineResult<PlaybackStream> {
    // Fail fast before spawning the decode thread.
    let reader = VideoReader::open(tools, path)?;
    let info = *reader.info();

    let (event_tx, event_rx) = bounded(2);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || pace_frames(reader, info.fps, &event_tx, &stop_flag));

    Ok(PlaybackStream {
        info,
        events: event_rx,
        stop,
        handle: Some(handle),
    })
}

fn pace_frames<I>(frames: I, fps: f64, event_tx: &Sender<PlaybackEvent>, stop: &AtomicBool)
where
    I: IntoIterator<Item = PipelineResult<Frame>>,
{
    let frame_interval = Duration::from_secs_f64(1.0 / fps.max(1.0));
    let started = Instant::now();
    let mut shown = 0usize;

    for frame in frames {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("playback decode failed: {err}");
                let _ = event_tx.try_send(PlaybackEvent::Failed(err.to_string()));
                return;
            }
        };

        let due = started + frame_interval.mul_f64(shown as f64);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }

        if !send_until_stopped(event_tx, PlaybackEvent::Frame(frame), stop) {
            return;
        }
        shown += 1;
    }

    send_until_stopped(event_tx, PlaybackEvent::Ended { frames: shown }, stop);
}

/// Blocks while the UI is behind, but gives up once `stop` is raised or the
/// receiver is gone.
fn send_until_stopped(event_tx: &Sender<PlaybackEvent>, mut event: PlaybackEvent, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        match event_tx.send_timeout(event, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => event = back,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PipelineError, video::test_support::synthetic_clip};

    fn frame(index: usize) -> PipelineResult<Frame> {
        Ok(Frame {
            rgba: vec![0; 4],
            width: 1,
            height: 1,
            index,
        })
    }

    #[test]
    fn frames_are_paced_and_followed_by_end() {
        let (tx, rx) = bounded(16);
        let stop = AtomicBool::new(false);
        let started = Instant::now();
        pace_frames((0..5).map(frame), 50.0, &tx, &stop);

        // Five frames at 50 fps: the last one is due 80ms in.
        assert!(started.elapsed() >= Duration::from_millis(75));
        let events: Vec<PlaybackEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 6);
        assert!(matches!(events[4], PlaybackEvent::Frame(Frame { index: 4, .. })));
        assert!(matches!(events[5], PlaybackEvent::Ended { frames: 5 }));
    }

    #[test]
    fn stop_flag_ends_a_blocked_sender() {
        let (tx, _rx) = bounded(1);
        let stop = AtomicBool::new(false);
        assert!(send_until_stopped(&tx, PlaybackEvent::Ended { frames: 0 }, &stop));
        stop.store(true, Ordering::SeqCst);
        assert!(!send_until_stopped(&tx, PlaybackEvent::Ended { frames: 0 }, &stop));
    }

    #[test]
    fn decode_errors_are_reported() {
        let (tx, rx) = bounded(4);
        let stop = AtomicBool::new(false);
        let frames = vec![frame(0), Err(PipelineError::decode("a.mp4", "truncated"))];
        pace_frames(frames, 30.0, &tx, &stop);
        let events: Vec<PlaybackEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], PlaybackEvent::Failed(_)));
    }

    #[test]
    #[ignore] // Needs ffmpeg and ffprobe on PATH.
    fn plays_a_real_clip_to_the_end() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let (tools, clip) = synthetic_clip(dir.path(), "clip.mp4", 32, 32, 4);
        let stream = start_playback(&tools, &clip).unwrap();
        let mut frames = 0;
        loop {
            match stream.events().recv_timeout(Duration::from_secs(10)).unwrap() {
                PlaybackEvent::Frame(_) => frames += 1,
                PlaybackEvent::Ended { frames: total } => {
                    assert_eq!(total, 4);
                    break;
                }
                PlaybackEvent::Failed(reason) => panic!("playback failed: {reason}"),
            }
        }
        assert_eq!(frames, 4);
        stream.stop();
    }
}
