use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid message: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] cerberus_store::StoreError),

    #[error("classifier error: {0}")]
    Bayes(#[from] cerberus_bayes::BayesError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] cerberus_scheduler::SchedulerError),

    #[error("client error: {0}")]
    Client(#[from] cerberus_clients::ClientError),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;
