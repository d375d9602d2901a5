use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::CanvasSize;

/// Smallest width or height an item may have.
pub const MIN_SIZE: f64 = 100.0;

/// Gap kept around each auto-arranged cell.
pub const PADDING: f64 = 8.0;

pub const DEFAULT_ITEM_WIDTH: f64 = 300.0;
pub const DEFAULT_ITEM_HEIGHT: f64 = 200.0;

/// Placement extent used before the canvas has been measured.
pub const FALLBACK_CANVAS: CanvasSize = CanvasSize::new(800.0, 450.0);

/// Offset applied per file when several files are dropped at once.
pub const DROP_OFFSET_STEP: f64 = 20.0;

/// Editing-surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollageConfig {
    pub min_size: f64,
    pub padding: f64,
    pub default_item_width: f64,
    pub default_item_height: f64,
    pub fallback_canvas: CanvasSize,
    pub drop_offset_step: f64,
    pub export: ExportSettings,
}

impl Default for CollageConfig {
    fn default() -> Self {
        Self {
            min_size: MIN_SIZE,
            padding: PADDING,
            default_item_width: DEFAULT_ITEM_WIDTH,
            default_item_height: DEFAULT_ITEM_HEIGHT,
            fallback_canvas: FALLBACK_CANVAS,
            drop_offset_step: DROP_OFFSET_STEP,
            export: ExportSettings::default(),
        }
    }
}

impl CollageConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_size <= 0.0 {
            return Err(CoreError::InvalidConfig("min_size must be positive".into()));
        }
        if self.padding < 0.0 {
            return Err(CoreError::InvalidConfig("padding must not be negative".into()));
        }
        if self.default_item_width < self.min_size || self.default_item_height < self.min_size {
            return Err(CoreError::InvalidConfig(
                "default item size must be at least min_size".into(),
            ));
        }
        if !self.fallback_canvas.is_measured() {
            return Err(CoreError::InvalidConfig(
                "fallback canvas must have a positive extent".into(),
            ));
        }
        self.export.validate()
    }
}

/// Output target of an export run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_ms: u64,
    pub bitrate: u64,
    pub container: String,
    pub codec: String,
    pub background: [u8; 4],
    /// Delay between restarting playback and capturing the first frame.
    pub warmup_ms: u64,
    pub file_prefix: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            duration_ms: 10_000,
            bitrate: 5_000_000,
            container: "webm".to_string(),
            codec: "vp9".to_string(),
            background: [0x0d, 0x0f, 0x12, 0xff],
            warmup_ms: 100,
            file_prefix: "video-collage".to_string(),
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CoreError::InvalidConfig(
                "export width/height must be non-zero".into(),
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(CoreError::InvalidConfig(
                "export width/height must be even".into(),
            ));
        }
        if self.fps == 0 {
            return Err(CoreError::InvalidConfig("export fps must be non-zero".into()));
        }
        if self.duration_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "export duration must be non-zero".into(),
            ));
        }
        if self.container.is_empty() || self.codec.is_empty() {
            return Err(CoreError::InvalidConfig(
                "export container and codec must be set".into(),
            ));
        }
        Ok(())
    }

    /// Number of frames an export run captures.
    pub fn total_frames(&self) -> u64 {
        (self.duration_ms * self.fps as u64).div_ceil(1000)
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps as f64)
    }

    pub fn mime_type(&self) -> String {
        format!("video/{}", self.container)
    }
}
