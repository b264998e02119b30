use crate::shortcode::ShortCode;
use thiserror::Error;

/// Result type for storage backend operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors reported by storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(ShortCode),
    #[error("short code not found: {0}")]
    NotFound(ShortCode),
    #[error("short code {0} is owned by another identity")]
    Unauthorized(ShortCode),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("snapshot failed: {0}")]
    Snapshot(String),
}

/// Errors surfaced to callers of the shortener facade.
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("url already shortened as {0}")]
    Conflict(ShortCode),
    #[error("short code not found: {0}")]
    NotFound(ShortCode),
    #[error("short code has been deleted: {0}")]
    Gone(ShortCode),
    #[error("not allowed to modify short code {0}")]
    Unauthorized(ShortCode),
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("failed to generate a short code: {0}")]
    InternalGenerationFailure(String),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => Self::Conflict(code),
            StorageError::NotFound(code) => Self::NotFound(code),
            StorageError::Unauthorized(code) => Self::Unauthorized(code),
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}
