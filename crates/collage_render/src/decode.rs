use collage_core::media::{PlaybackError, VideoFrame, VideoSource};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::error::{RenderError, Result};

/// Resolution frames are decoded at until a render size is known.
pub const DEFAULT_DECODE_SIZE: (u32, u32) = (640, 360);

const MAX_DECODE_SIDE: u32 = 4096;

/// Round a requested draw size to an even decode size in `2..=4096`.
pub fn decode_size_for(width: u32, height: u32) -> (u32, u32) {
    let even = |v: u32| (v.clamp(2, MAX_DECODE_SIDE) + 1) & !1;
    (even(width), even(height))
}

pub fn build_decode_args(path: &Path, width: u32, height: u32) -> Vec<String> {
    vec![
        "-loglevel".to_string(),
        "error".to_string(),
        "-re".to_string(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        path.to_string_lossy().to_string(),
        "-an".to_string(),
        "-vf".to_string(),
        format!("scale={width}:{height}"),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "pipe:1".to_string(),
    ]
}

struct Playback {
    child: Child,
    reader: Option<JoinHandle<()>>,
}

impl Playback {
    /// Signal the process and reap it. Inside a tokio runtime the wait and
    /// reader join run on the blocking pool so the caller never stalls.
    fn stop(mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("ffmpeg decoder already exited: {e}");
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || self.reap());
            }
            Err(_) => self.reap(),
        }
    }

    fn reap(mut self) {
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Live video source backed by an `ffmpeg` child process.
///
/// Playback runs `ffmpeg -re -stream_loop -1` so frames arrive at the clip's
/// native rate and the clip loops forever. A reader thread keeps the most
/// recent decoded frame; pausing stops the process and freezes that frame.
pub struct FfmpegVideoSource {
    path: PathBuf,
    binary: PathBuf,
    width: AtomicU32,
    height: AtomicU32,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    playback: Mutex<Option<Playback>>,
    released: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl FfmpegVideoSource {
    /// Open a clip for decoding at `decode_size`. Playback starts on the
    /// first [`VideoSource::restart`].
    pub fn open(path: impl Into<PathBuf>, decode_size: (u32, u32)) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(RenderError::FileNotFound(path));
        }
        let (width, height) = decode_size;
        if width == 0 || height == 0 {
            return Err(anyhow::anyhow!("decode size must be non-zero").into());
        }
        Ok(Self {
            path,
            binary: PathBuf::from("ffmpeg"),
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
            latest: Arc::new(Mutex::new(None)),
            playback: Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn decode_size(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Acquire),
            self.height.load(Ordering::Acquire),
        )
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.playback).is_some()
    }

    fn stop_playback(&self) {
        let playback = lock(&self.playback).take();
        if let Some(playback) = playback {
            playback.stop();
        }
    }

    fn spawn_playback(&self) -> std::result::Result<Playback, PlaybackError> {
        let (width, height) = self.decode_size();
        let args = build_decode_args(&self.path, width, height);
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlaybackError::StartFailed(format!("failed to start ffmpeg: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlaybackError::StartFailed("failed to open ffmpeg stdout".into()))?;

        let latest = Arc::clone(&self.latest);
        let frame_len = width as usize * height as usize * 4;
        let name = self.path.display().to_string();

        let reader = std::thread::Builder::new()
            .name("collage-decode".into())
            .spawn(move || {
                let mut buf = vec![0u8; frame_len];
                while stdout.read_exact(&mut buf).is_ok() {
                    if let Some(frame) = VideoFrame::from_rgba(width, height, buf.clone()) {
                        *lock(&latest) = Some(frame);
                    }
                }
                tracing::debug!(source = %name, "decoder stream ended");
            })
            .map_err(|e| PlaybackError::StartFailed(format!("failed to start reader: {e}")))?;

        Ok(Playback {
            child,
            reader: Some(reader),
        })
    }
}

impl VideoSource for FfmpegVideoSource {
    fn restart(&self) -> std::result::Result<(), PlaybackError> {
        if self.released.load(Ordering::Acquire) {
            return Err(PlaybackError::Released);
        }
        self.stop_playback();
        *lock(&self.latest) = None;
        let playback = self.spawn_playback()?;
        *lock(&self.playback) = Some(playback);
        tracing::debug!(source = %self.path.display(), "playback restarted");
        Ok(())
    }

    fn pause(&self) {
        self.stop_playback();
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        lock(&self.latest).clone()
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_playback();
        *lock(&self.latest) = None;
        tracing::debug!(source = %self.path.display(), "source released");
    }

    fn set_render_size(&self, width: u32, height: u32) {
        let (width, height) = decode_size_for(width, height);
        self.width.store(width, Ordering::Release);
        self.height.store(height, Ordering::Release);
    }
}

impl Drop for FfmpegVideoSource {
    fn drop(&mut self) {
        self.stop_playback();
    }
}
