use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("invalid priority value: {0} (must be in 1..=10)")]
    InvalidPriority(i32),

    #[error("task in invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("task cannot be retried: retries ({retries}) already at max_retries ({max_retries})")]
    RetriesExhausted { retries: u32, max_retries: u32 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
