use async_trait::async_trait;
use satchel_store::{
    AttributeUpdate, DocumentStore, Item, Key, MemoryStore, Page, QueryRequest, ScanRequest,
    StoreError, StoreResult, TableSchema,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Store that fails the first `failures` data operations with the given error
/// kind, then delegates to an in-memory store. Counts every call.
#[allow(dead_code)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
    transient: bool,
    pub calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn transient(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
            transient: true,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn permanent(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
            transient: false,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !injected {
            return Ok(());
        }
        if self.transient {
            Err(StoreError::Transient("injected throttling".to_string()))
        } else {
            Err(StoreError::InvalidRequest("injected failure".to_string()))
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        self.inner.ensure_table(table, schema).await
    }

    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Item>> {
        self.maybe_fail()?;
        self.inner.get(table, key).await
    }

    async fn put(&self, table: &str, item: Item) -> StoreResult<()> {
        self.maybe_fail()?;
        self.inner.put(table, item).await
    }

    async fn update(
        &self,
        table: &str,
        key: &Key,
        updates: Vec<AttributeUpdate>,
    ) -> StoreResult<()> {
        self.maybe_fail()?;
        self.inner.update(table, key, updates).await
    }

    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        self.maybe_fail()?;
        self.inner.delete(table, key).await
    }

    async fn query(&self, table: &str, request: QueryRequest) -> StoreResult<Page> {
        self.maybe_fail()?;
        self.inner.query(table, request).await
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> StoreResult<Page> {
        self.maybe_fail()?;
        self.inner.scan(table, request).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
