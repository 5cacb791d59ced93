use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("key generation failed: {0}")]
    KeyGen(String),

    #[error("value encoding failed: {0}")]
    Encode(String),

    #[error("value decoding failed: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
