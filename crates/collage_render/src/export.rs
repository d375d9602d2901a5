use collage_core::config::ExportSettings;
use collage_core::media::PlaybackError;
use collage_core::scene::{SceneSnapshot, SkipReason, SnapshotItem};
use collage_core::types::ItemId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::artifact::{Artifact, ArtifactSink};
use crate::encode::{EncodeConfig, EncoderFactory, FrameEncoder};
use crate::error::Result;
use crate::frame::FrameBuffer;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Exporting,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum ExportPhase {
    #[default]
    Idle,
    Starting,
    Rendering,
    Finalizing,
    Complete,
    Cancelled,
    Failed(String),
}

/// Progress update published while an export runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    pub frame: u64,
    pub total_frames: u64,
    pub percent: f64,
}

#[derive(Debug)]
pub struct ExportReport {
    pub artifact: Artifact,
    pub frames: u64,
    /// Items whose playback could not be restarted. They render as background.
    pub playback_failures: Vec<(ItemId, PlaybackError)>,
}

#[derive(Debug)]
pub enum ExportOutcome {
    Skipped(SkipReason),
    Cancelled,
    Completed(ExportReport),
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Paint one frame: background, then every item's current frame in the
/// snapshot's paint order. Items without a decoded frame are skipped.
pub fn compose_frame(
    frame: &mut FrameBuffer,
    items: &[SnapshotItem],
    scale_x: f64,
    scale_y: f64,
    background: [u8; 4],
) {
    frame.clear(background);
    for item in items {
        if let Some(video) = item.source.current_frame() {
            frame.draw_scaled(&video, item.rect.scaled(scale_x, scale_y));
        }
    }
}

fn pause_all(items: &[SnapshotItem]) {
    for item in items {
        item.source.pause();
    }
}

/// Fixed-rate compositing loop that turns a scene snapshot into one encoded
/// artifact.
///
/// A run restarts every source, waits a short warm-up, then paints
/// `total_frames` frames on a single periodic timer with fixed deadlines, so
/// a late tick is caught up instead of shifting every later frame. The scene
/// lock and the busy flag are released on every exit path.
pub struct ExportPipeline {
    settings: ExportSettings,
    busy: AtomicBool,
    cancel: Mutex<CancellationToken>,
    progress: watch::Sender<ExportProgress>,
}

impl ExportPipeline {
    pub fn new(settings: ExportSettings) -> Result<Self> {
        settings.validate()?;
        let (progress, _) = watch::channel(ExportProgress::default());
        Ok(Self {
            settings,
            busy: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            progress,
        })
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn state(&self) -> ExportState {
        if self.busy.load(Ordering::Acquire) {
            ExportState::Exporting
        } else {
            ExportState::Idle
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportProgress> {
        self.progress.subscribe()
    }

    /// Stop the running export, if any. The encoder is torn down and no
    /// artifact is produced.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    fn publish(&self, phase: ExportPhase, frame: u64, total_frames: u64) {
        let percent = if total_frames > 0 {
            (frame as f64 / total_frames as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        self.progress.send_replace(ExportProgress {
            phase,
            frame,
            total_frames,
            percent,
        });
    }

    /// Render `snapshot` and deliver the result to `sink`.
    ///
    /// A missing snapshot or a request while another export is running is a
    /// no-op reported as [`ExportOutcome::Skipped`]. Failures are published
    /// as [`ExportPhase::Failed`] and returned.
    pub async fn export<F, S>(
        &self,
        snapshot: std::result::Result<SceneSnapshot, SkipReason>,
        encoders: &F,
        sink: &S,
    ) -> Result<ExportOutcome>
    where
        F: EncoderFactory,
        S: ArtifactSink,
    {
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                tracing::debug!(%reason, "export skipped");
                return Ok(ExportOutcome::Skipped(reason));
            }
        };
        if !snapshot.canvas.is_measured() {
            return Ok(ExportOutcome::Skipped(SkipReason::CanvasUnknown));
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("export skipped: already exporting");
            return Ok(ExportOutcome::Skipped(SkipReason::AlreadyExporting));
        };

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();

        let total = self.settings.total_frames();
        self.publish(ExportPhase::Starting, 0, total);
        tracing::info!(
            items = snapshot.items.len(),
            width = self.settings.width,
            height = self.settings.height,
            fps = self.settings.fps,
            duration_ms = self.settings.duration_ms,
            "starting export"
        );

        match self.run(&snapshot, encoders, sink, &token).await {
            Ok(outcome) => {
                match &outcome {
                    ExportOutcome::Completed(report) => {
                        self.publish(ExportPhase::Complete, report.frames, total);
                        tracing::info!(file = %report.artifact.file_name, "export complete");
                    }
                    ExportOutcome::Cancelled => {
                        let frame = self.progress.borrow().frame;
                        self.publish(ExportPhase::Cancelled, frame, total);
                        tracing::info!("export cancelled");
                    }
                    ExportOutcome::Skipped(_) => {}
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("export failed: {e}");
                let frame = self.progress.borrow().frame;
                self.publish(ExportPhase::Failed(e.to_string()), frame, total);
                Err(e)
            }
        }
    }

    async fn run<F, S>(
        &self,
        snapshot: &SceneSnapshot,
        encoders: &F,
        sink: &S,
        token: &CancellationToken,
    ) -> Result<ExportOutcome>
    where
        F: EncoderFactory,
        S: ArtifactSink,
    {
        let settings = &self.settings;
        let mut frame = FrameBuffer::new(settings.width, settings.height);
        let scale_x = settings.width as f64 / snapshot.canvas.width;
        let scale_y = settings.height as f64 / snapshot.canvas.height;

        let mut encoder = encoders.open(&EncodeConfig::from_settings(settings))?;

        let mut playback_failures = Vec::new();
        for item in &snapshot.items {
            let dest = item.rect.scaled(scale_x, scale_y);
            item.source.set_render_size(
                dest.width.round().max(1.0) as u32,
                dest.height.round().max(1.0) as u32,
            );
            if let Err(e) = item.source.restart() {
                tracing::warn!(id = %item.id, name = %item.display_name, "playback did not start: {e}");
                playback_failures.push((item.id, e));
            }
        }

        let total = settings.total_frames();
        let start = Instant::now() + std::time::Duration::from_millis(settings.warmup_ms);
        let mut ticker = tokio::time::interval_at(start, settings.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let mut rendered = 0u64;
        while rendered < total {
            let cancelled = tokio::select! {
                biased;
                _ = token.cancelled() => true,
                _ = ticker.tick() => false,
            };
            if cancelled {
                encoder.abort().await;
                pause_all(&snapshot.items);
                return Ok(ExportOutcome::Cancelled);
            }

            compose_frame(&mut frame, &snapshot.items, scale_x, scale_y, settings.background);
            let encoded = encoder.encode_frame(&frame).await;
            if let Err(e) = encoded {
                encoder.abort().await;
                pause_all(&snapshot.items);
                return Err(e);
            }

            rendered += 1;
            self.publish(ExportPhase::Rendering, rendered, total);
        }

        pause_all(&snapshot.items);
        self.publish(ExportPhase::Finalizing, rendered, total);

        let bytes = encoder.finish().await?;
        let artifact = Artifact::new(settings, bytes);
        sink.deliver(&artifact)?;

        Ok(ExportOutcome::Completed(ExportReport {
            artifact,
            frames: rendered,
            playback_failures,
        }))
    }
}
