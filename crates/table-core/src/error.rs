use thiserror::Error;

/// Status taxonomy shared by every operation in the engine.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl From<std::io::Error> for TableError {
    fn from(err: std::io::Error) -> Self {
        TableError::IoError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for TableError {
    fn from(err: arrow::error::ArrowError) -> Self {
        TableError::ExecutionError(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, TableError>;
