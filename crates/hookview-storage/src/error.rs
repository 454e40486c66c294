//! Storage error types.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("snapshot task failed: {0}")]
    Task(String),

    #[error("snapshot writer is not running")]
    WriterClosed,
}

pub type Result<T> = std::result::Result<T, StorageError>;
