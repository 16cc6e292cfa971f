//! Document store abstraction and backends for Satchel.
//!
//! This crate provides:
//! - The narrow capability interface the table layer consumes (`DocumentStore`)
//! - Parameterized filter and key-condition expressions
//! - Backends: in-memory and local filesystem
//! - A retrying wrapper for transient failures

pub mod backends;
pub mod error;
mod eval;
pub mod expression;
pub mod retry;
pub mod traits;

pub use backends::{filesystem::FilesystemStore, memory::MemoryStore};
pub use error::{StoreError, StoreResult};
pub use expression::Expression;
pub use retry::RetryingStore;
pub use traits::{
    AttributeUpdate, Document, DocumentStore, IndexSchema, Item, Key, Page, QueryRequest,
    ScanRequest, TableSchema,
};

use satchel_core::config::{RetryConfig, StoreConfig};
use std::sync::Arc;

/// Create a document store from configuration.
///
/// The backend is wrapped in a [`RetryingStore`] unless retries are disabled.
pub async fn from_config(
    config: &StoreConfig,
    retry: &RetryConfig,
) -> StoreResult<Arc<dyn DocumentStore>> {
    config.validate().map_err(StoreError::Config)?;
    retry.validate().map_err(StoreError::Config)?;

    let backend: Arc<dyn DocumentStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Filesystem { path } => Arc::new(FilesystemStore::new(path).await?),
    };

    if retry.max_attempts > 1 {
        Ok(Arc::new(RetryingStore::new(backend, retry.clone())))
    } else {
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_memory_ok() {
        let store = from_config(&StoreConfig::Memory, &RetryConfig::disabled())
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "memory");
        store
            .ensure_table("t", &TableSchema::new("tenant", None))
            .await
            .unwrap();
        store
            .put("t", json!({"tenant": "a"}).as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StoreConfig::Filesystem {
            path: temp.path().join("tables"),
        };
        let store = from_config(&config, &RetryConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
        store.health_check().await.unwrap();
        assert!(temp.path().join("tables").is_dir());
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_retry() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        match from_config(&StoreConfig::Memory, &retry).await {
            Ok(_) => panic!("expected error"),
            Err(StoreError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
