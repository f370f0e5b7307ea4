use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("telemetry fetch failed: {0}")]
    Fetch(String),

    #[error("telemetry payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to load classifier from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("unexpected classifier shape: {0}")]
    ModelShape(String),

    #[error("invalid classifier output: {0}")]
    ModelOutput(String),

    #[error("class index {0} is outside the advisory mode table")]
    ClassOutOfRange(usize),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
