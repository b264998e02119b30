use std::result::Result as StdResult;
use thiserror::Error;

/// Errors that can occur while preparing test fixtures.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A type alias for `Result` with `TestInfraError`.
pub type Result<T> = StdResult<T, TestInfraError>;
