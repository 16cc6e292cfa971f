//! Out-of-band binary assets referenced by records.

use crate::error::TableResult;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

/// Existence check and removal of assets by key.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn exists(&self, key: &str) -> TableResult<bool>;

    /// Delete an asset. Deleting a missing asset is not an error.
    async fn delete(&self, key: &str) -> TableResult<()>;
}

/// Process-local asset index.
#[derive(Default)]
pub struct MemoryAssetStore {
    keys: RwLock<HashSet<String>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>) {
        self.write().insert(key.into());
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashSet<String>> {
        self.keys.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Asset store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<String>> {
        self.keys.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Asset store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn exists(&self, key: &str) -> TableResult<bool> {
        Ok(self.read().contains(key))
    }

    async fn delete(&self, key: &str) -> TableResult<()> {
        self.write().remove(key);
        Ok(())
    }
}
