//! Store error types.

use thiserror::Error;

/// Document store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the failure may succeed if the same request is issued again.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
