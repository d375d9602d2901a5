use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scene is locked while an export is running")]
    SceneLocked,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
