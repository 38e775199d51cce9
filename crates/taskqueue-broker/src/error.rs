use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("invalid priority: {0}")]
    InvalidPriority(#[from] taskqueue_core::TaskError),

    #[error(transparent)]
    Store(#[from] taskqueue_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to initialize metrics registry")]
    MetricsInit,
}

pub type Result<T> = std::result::Result<T, BrokerError>;
