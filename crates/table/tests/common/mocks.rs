use async_trait::async_trait;
use satchel_store::{
    AttributeUpdate, DocumentStore, Item, Key, MemoryStore, Page, QueryRequest, ScanRequest,
    StoreError, StoreResult, TableSchema,
};
use satchel_table::{Cursor, PageSource, TableResult};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory store that fails puts or deletes of chosen item ids once armed.
#[allow(dead_code)]
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_put(&self, id: &str) {
        self.failing_puts.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_delete(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    fn check(set: &Mutex<HashSet<String>>, op: &str, item: &Item) -> StoreResult<()> {
        let id = item.get("id").and_then(Value::as_str).unwrap_or_default();
        if set.lock().unwrap().contains(id) {
            return Err(StoreError::InvalidRequest(format!("injected {op} failure for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        self.inner.ensure_table(table, schema).await
    }

    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Item>> {
        self.inner.get(table, key).await
    }

    async fn put(&self, table: &str, item: Item) -> StoreResult<()> {
        Self::check(&self.failing_puts, "put", &item)?;
        self.inner.put(table, item).await
    }

    async fn update(
        &self,
        table: &str,
        key: &Key,
        updates: Vec<AttributeUpdate>,
    ) -> StoreResult<()> {
        self.inner.update(table, key, updates).await
    }

    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        Self::check(&self.failing_deletes, "delete", key)?;
        self.inner.delete(table, key).await
    }

    async fn query(&self, table: &str, request: QueryRequest) -> StoreResult<Page> {
        self.inner.query(table, request).await
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> StoreResult<Page> {
        self.inner.scan(table, request).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

/// Page source over the numbers `0..total` that counts fetches and records
/// the highest number of fetches running at once.
#[allow(dead_code)]
pub struct CountingSource {
    total: u32,
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl CountingSource {
    pub fn new(total: u32, delay_ms: u64) -> Self {
        Self {
            total,
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource<u32> for CountingSource {
    async fn fetch(&self, page_size: usize, cursor: &mut Cursor) -> TableResult<Vec<u32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let start = cursor
            .exclusive_start()
            .and_then(|key| key.get("n").and_then(Value::as_u64))
            .map(|n| n as u32 + 1)
            .unwrap_or(0);
        let end = (start + page_size as u32).min(self.total);
        let page: Vec<u32> = (start..end).collect();
        let next = (end < self.total).then(|| {
            json!({"n": end - 1})
                .as_object()
                .cloned()
                .unwrap_or_default()
        });
        cursor.set(next);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(page)
    }
}
