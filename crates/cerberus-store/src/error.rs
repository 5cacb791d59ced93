use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("user not found: chat {chat_id}, user {user_id}")]
    UserNotFound { chat_id: i64, user_id: i64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;
