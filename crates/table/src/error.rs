//! Table layer error types.

use satchel_store::StoreError;
use thiserror::Error;

/// Table, pager and identity operation errors.
#[derive(Debug, Error)]
pub enum TableError {
    /// Unrecovered failure from the document store, surfaced unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid cursor token: {0}")]
    InvalidCursor(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("table '{0}' requires an item id")]
    MissingItemId(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        TableError::Codec(err.to_string())
    }
}

impl From<satchel_core::Error> for TableError {
    fn from(err: satchel_core::Error) -> Self {
        TableError::Config(err.to_string())
    }
}

/// Result type for table operations.
pub type TableResult<T> = std::result::Result<T, TableError>;
