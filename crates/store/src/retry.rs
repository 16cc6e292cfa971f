//! Store access wrapper that retries transient failures.

use crate::error::StoreResult;
use crate::traits::{
    AttributeUpdate, DocumentStore, Item, Key, Page, QueryRequest, ScanRequest, TableSchema,
};
use async_trait::async_trait;
use satchel_core::config::RetryConfig;
use std::future::Future;
use std::sync::Arc;

/// Wraps a store and retries operations failing with a transient error,
/// backing off exponentially between attempts. Other errors are returned
/// immediately.
pub struct RetryingStore {
    inner: Arc<dyn DocumentStore>,
    config: RetryConfig,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn DocumentStore>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &Arc<dyn DocumentStore> {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, table: &str, f: F) -> StoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        operation,
                        table = %table,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl DocumentStore for RetryingStore {
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        self.with_retry("ensure_table", table, || {
            self.inner.ensure_table(table, schema)
        })
        .await
    }

    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Item>> {
        self.with_retry("get", table, || self.inner.get(table, key))
            .await
    }

    async fn put(&self, table: &str, item: Item) -> StoreResult<()> {
        self.with_retry("put", table, || self.inner.put(table, item.clone()))
            .await
    }

    async fn update(
        &self,
        table: &str,
        key: &Key,
        updates: Vec<AttributeUpdate>,
    ) -> StoreResult<()> {
        self.with_retry("update", table, || {
            self.inner.update(table, key, updates.clone())
        })
        .await
    }

    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        self.with_retry("delete", table, || self.inner.delete(table, key))
            .await
    }

    async fn query(&self, table: &str, request: QueryRequest) -> StoreResult<Page> {
        self.with_retry("query", table, || self.inner.query(table, request.clone()))
            .await
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> StoreResult<Page> {
        self.with_retry("scan", table, || self.inner.scan(table, request.clone()))
            .await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }
}
