//! Error types for LabelForge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Provider timed out after {0}ms")]
    ProviderTimeout(u64),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Label model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Label '{0}' is not in the project schema")]
    SchemaViolation(String),

    #[error("No unlabeled samples in project {0}")]
    EmptyPool(i64),

    #[error("Sample {0} is already leased by another pipeline")]
    ConcurrencyConflict(i64),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error aborts a whole batch rather than a single sample.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
