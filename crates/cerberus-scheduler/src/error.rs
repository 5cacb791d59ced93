use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid task payload: {0}")]
    InvalidPayload(String),

    #[error("task not found: {id}")]
    TaskNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
