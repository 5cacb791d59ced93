use thiserror::Error;

#[derive(Debug, Error)]
pub enum BayesError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("empty training message")]
    EmptyMessage,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BayesError>;
