use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("store I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
