use thiserror::Error;

#[derive(Debug, Error)]
pub enum GoldenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no recorded call matches {method} {url}")]
    ReplayMiss { method: String, url: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown collect target: {0}")]
    UnknownTarget(String),

    #[error("scenario failed: {0}")]
    ScenarioFailed(String),
}

pub type Result<T> = std::result::Result<T, GoldenError>;
