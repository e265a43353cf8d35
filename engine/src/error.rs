//! Error types for the resync engine.

use crate::{FieldName, Key, TableName};
use thiserror::Error;

/// Boxed error raised by a storage backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All possible errors from the resync engine.
#[derive(Debug, Error)]
pub enum Error {
    // Input errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    // Configuration errors
    #[error("composite primary keys are not supported (table '{0}')")]
    CompositePrimaryKey(TableName),

    #[error("table not found: {0}")]
    TableNotFound(TableName),

    // Key errors
    #[error("record has no primary key in field '{0}'")]
    MissingKey(FieldName),

    #[error("invalid primary key for field '{field}': {value}")]
    InvalidKey { field: FieldName, value: String },

    // Storage errors
    #[error("duplicate key: {0}")]
    DuplicateKey(Key),

    #[error("key not found: {0}")]
    KeyNotFound(Key),

    #[error("storage backend error: {0}")]
    Backend(#[source] BackendError),
}

impl Error {
    /// Wrap any backend error so it reaches the caller unmodified.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Backend(Box::new(err))
    }

    /// Whether the error was caused by caller input rather than storage.
    ///
    /// Most input errors surface before any write, but a missing key on a
    /// table without auto-increment is only detected by the insert, after the
    /// delete stage has run.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::InvalidRecord(_)
                | Error::InvalidSettings(_)
                | Error::CompositePrimaryKey(_)
                | Error::MissingKey(_)
                | Error::InvalidKey { .. }
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
