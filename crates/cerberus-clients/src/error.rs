use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] cerberus_golden::GoldenError),

    #[error("Request failed with status {status}")]
    RequestFailed { status: u16 },

    #[error("Content is not text, but {content_type}")]
    NotText { content_type: String },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("nothing found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, ClientError>;
