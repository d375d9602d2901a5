use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("frame size mismatch: got {got_width}x{got_height}, expected {width}x{height}")]
    FrameSizeMismatch {
        got_width: u32,
        got_height: u32,
        width: u32,
        height: u32,
    },

    #[error(transparent)]
    Core(#[from] collage_core::error::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
