use collage_core::config::ExportSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::error::{RenderError, Result};
use crate::frame::FrameBuffer;

/// Parameters of one encoder session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: u64,
    pub container: String,
    pub codec: String,
}

impl EncodeConfig {
    pub fn from_settings(settings: &ExportSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            bitrate: settings.bitrate,
            container: settings.container.clone(),
            codec: settings.codec.clone(),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Sink for composed frames that produces one encoded container.
#[allow(async_fn_in_trait)]
pub trait FrameEncoder {
    /// Queue one RGBA frame.
    async fn encode_frame(&mut self, frame: &FrameBuffer) -> Result<()>;

    /// Flush and return the complete encoded container.
    async fn finish(self) -> Result<Vec<u8>>;

    /// Tear the session down, discarding any output.
    async fn abort(self);
}

/// Opens encoder sessions for export runs.
pub trait EncoderFactory {
    type Encoder: FrameEncoder;

    fn open(&self, cfg: &EncodeConfig) -> Result<Self::Encoder>;
}

// ---------------------------------------------------------------------------
// ffmpeg
// ---------------------------------------------------------------------------

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ffmpeg_codec(codec: &str) -> &str {
    match codec {
        "vp9" => "libvpx-vp9",
        "vp8" => "libvpx",
        "h264" => "libx264",
        "av1" => "libaom-av1",
        other => other,
    }
}

/// Build ffmpeg args reading raw RGBA frames on stdin and writing the
/// container to stdout.
pub fn build_ffmpeg_args(cfg: &EncodeConfig) -> Vec<String> {
    let codec = ffmpeg_codec(&cfg.codec);
    let mut args: Vec<String> = [
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(format!("{}x{}", cfg.width, cfg.height));
    args.extend(["-r".to_string(), cfg.fps.to_string()]);
    args.extend(["-i", "pipe:0", "-an", "-c:v"].iter().map(|s| s.to_string()));
    args.push(codec.to_string());
    args.extend(["-b:v".to_string(), cfg.bitrate.to_string()]);

    if codec.starts_with("libvpx") {
        args.extend(
            ["-deadline", "realtime", "-cpu-used", "8"]
                .iter()
                .map(|s| s.to_string()),
        );
    }

    args.extend(
        ["-pix_fmt", "yuv420p", "-f"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(cfg.container.clone());
    args.push("pipe:1".to_string());
    args
}

/// Spawns one `ffmpeg` process per export run.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    pub binary: PathBuf,
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    type Encoder = FfmpegEncoder;

    fn open(&self, cfg: &EncodeConfig) -> Result<FfmpegEncoder> {
        FfmpegEncoder::spawn(&self.binary, cfg.clone())
    }
}

pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    output: JoinHandle<std::io::Result<Vec<u8>>>,
    stderr: JoinHandle<String>,
}

impl FfmpegEncoder {
    pub fn spawn(binary: &std::path::Path, cfg: EncodeConfig) -> Result<Self> {
        let args = build_ffmpeg_args(&cfg);
        tracing::debug!(?args, "spawning ffmpeg encoder");

        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::FfmpegNotFound
                } else {
                    RenderError::Io(e)
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::Encoder("failed to open ffmpeg stdin".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::Encoder("failed to open ffmpeg stdout".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::Encoder("failed to open ffmpeg stderr".into()))?;

        // Drain encoded chunks as they become available so the pipe never fills up.
        let output = tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                chunks.extend_from_slice(&buf[..n]);
            }
            Ok(chunks)
        });

        let stderr = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        Ok(Self {
            cfg,
            child,
            stdin: Some(stdin),
            output,
            stderr,
        })
    }
}

impl FrameEncoder for FfmpegEncoder {
    async fn encode_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        if frame.width() != self.cfg.width || frame.height() != self.cfg.height {
            return Err(RenderError::FrameSizeMismatch {
                got_width: frame.width(),
                got_height: frame.height(),
                width: self.cfg.width,
                height: self.cfg.height,
            });
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RenderError::Encoder("ffmpeg encoder is already finalized".into()));
        };

        stdin
            .write_all(frame.as_raw())
            .await
            .map_err(|e| RenderError::Encoder(format!("failed to write frame to ffmpeg stdin: {e}")))
    }

    async fn finish(mut self) -> Result<Vec<u8>> {
        drop(self.stdin.take());

        let status = self.child.wait().await.map_err(RenderError::Io)?;
        let bytes = self
            .output
            .await
            .map_err(|e| RenderError::Encoder(format!("output reader failed: {e}")))?
            .map_err(RenderError::Io)?;
        let stderr = self.stderr.await.unwrap_or_default();

        if !status.success() {
            return Err(RenderError::FfmpegFailed(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim()
            )));
        }
        if bytes.is_empty() {
            return Err(RenderError::Encoder("ffmpeg produced no output".into()));
        }

        Ok(bytes)
    }

    async fn abort(mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("failed to kill ffmpeg encoder: {e}");
        }
        let _ = self.child.wait().await;
        self.output.abort();
        self.stderr.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webm_config() -> EncodeConfig {
        EncodeConfig::from_settings(&ExportSettings::default())
    }

    #[test]
    fn config_follows_export_settings() {
        let cfg = webm_config();
        assert_eq!((cfg.width, cfg.height, cfg.fps), (1920, 1080, 30));
        assert_eq!(cfg.bitrate, 5_000_000);
        assert_eq!(cfg.frame_len(), 1920 * 1080 * 4);
    }

    #[test]
    fn args_describe_raw_input_and_webm_output() {
        let args = build_ffmpeg_args(&webm_config());
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 1920x1080 -r 30 -i pipe:0"));
        assert!(joined.contains("-c:v libvpx-vp9"));
        assert!(joined.contains("-b:v 5000000"));
        assert!(joined.contains("-deadline realtime"));
        assert!(joined.ends_with("-f webm pipe:1"));
    }

    #[test]
    fn non_vpx_codec_skips_realtime_flags() {
        let cfg = EncodeConfig {
            codec: "h264".into(),
            container: "matroska".into(),
            ..webm_config()
        };
        let args = build_ffmpeg_args(&cfg);
        assert!(args.contains(&"libx264".to_string()));
        assert!(!args.contains(&"-deadline".to_string()));
    }

    #[tokio::test]
    async fn missing_binary_reports_not_found() {
        let factory = FfmpegEncoderFactory {
            binary: PathBuf::from("/nonexistent/ffmpeg-collage-test"),
        };
        let err = factory.open(&webm_config()).err().unwrap();
        assert!(matches!(err, RenderError::FfmpegNotFound));
    }

    #[tokio::test]
    async fn encodes_small_webm() {
        if !is_ffmpeg_on_path() {
            eprintln!("Skipping encodes_small_webm: ffmpeg not available");
            return;
        }

        let cfg = EncodeConfig {
            width: 64,
            height: 36,
            fps: 10,
            ..webm_config()
        };
        let mut encoder = FfmpegEncoderFactory::default().open(&cfg).unwrap();
        let mut frame = FrameBuffer::new(64, 36);
        for i in 0..10u8 {
            frame.clear([i * 20, 0, 0, 255]);
            encoder.encode_frame(&frame).await.unwrap();
        }
        let bytes = match encoder.finish().await {
            Ok(bytes) => bytes,
            Err(e) => {
                // ffmpeg builds without libvpx cannot produce vp9
                eprintln!("Skipping encodes_small_webm: {e}");
                return;
            }
        };
        // EBML magic
        assert_eq!(&bytes[..4], &[0x1a, 0x45, 0xdf, 0xa3]);
    }

    #[tokio::test]
    async fn wrong_frame_size_is_rejected() {
        if !is_ffmpeg_on_path() {
            eprintln!("Skipping wrong_frame_size_is_rejected: ffmpeg not available");
            return;
        }
        let cfg = EncodeConfig {
            width: 64,
            height: 36,
            ..webm_config()
        };
        let mut encoder = FfmpegEncoderFactory::default().open(&cfg).unwrap();
        let err = encoder.encode_frame(&FrameBuffer::new(32, 32)).await.unwrap_err();
        assert!(matches!(err, RenderError::FrameSizeMismatch { .. }));
        encoder.abort().await;
    }
}
