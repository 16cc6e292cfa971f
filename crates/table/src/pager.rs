//! Page-at-a-time iteration over a table query or scan.
//!
//! A [`Pager`] owns the cursor of one paging session and allows at most one
//! fetch in flight: a caller arriving while a fetch is outstanding waits for
//! it to finish, then issues its own from the updated cursor.

use crate::cursor::Cursor;
use crate::error::TableResult;
use crate::record::Record;
use crate::table::{QueryOptions, Table};
use async_trait::async_trait;
use futures::Stream;
use satchel_store::Expression;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// The page-fetch step a pager delegates to its table.
#[async_trait]
pub trait PageSource<R>: Send + Sync {
    /// Fetch up to `page_size` rows after `cursor`, updating it from the
    /// store response.
    async fn fetch(&self, page_size: usize, cursor: &mut Cursor) -> TableResult<Vec<R>>;
}

/// Key-condition query over the current tenant's partition.
pub struct QuerySource<R> {
    table: Arc<Table<R>>,
    options: QueryOptions,
}

impl<R> QuerySource<R> {
    pub fn new(table: Arc<Table<R>>, options: QueryOptions) -> Self {
        Self { table, options }
    }
}

#[async_trait]
impl<R: Record> PageSource<R> for QuerySource<R> {
    async fn fetch(&self, page_size: usize, cursor: &mut Cursor) -> TableResult<Vec<R>> {
        let options = QueryOptions {
            page_size: Some(page_size),
            ..self.options.clone()
        };
        self.table.query(&options, Some(cursor)).await
    }
}

/// Filtered scan over the current tenant's rows.
pub struct ScanSource<R> {
    table: Arc<Table<R>>,
    filter: Expression,
}

impl<R> ScanSource<R> {
    pub fn new(table: Arc<Table<R>>, filter: Expression) -> Self {
        Self { table, filter }
    }
}

#[async_trait]
impl<R: Record> PageSource<R> for ScanSource<R> {
    async fn fetch(&self, page_size: usize, cursor: &mut Cursor) -> TableResult<Vec<R>> {
        self.table
            .scan(&self.filter, Some(page_size), Some(cursor))
            .await
    }
}

pub struct Pager<R> {
    source: Arc<dyn PageSource<R>>,
    cursor: Mutex<Cursor>,
    in_flight: tokio::sync::Mutex<()>,
}

impl<R: Send + 'static> Pager<R> {
    pub fn new(source: Arc<dyn PageSource<R>>) -> Self {
        Self {
            source,
            cursor: Mutex::new(Cursor::new()),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Continue from a cursor saved by an earlier session.
    pub fn resume(self, cursor: Cursor) -> Self {
        *self.lock_cursor() = cursor;
        self
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Pager cursor lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn has_more(&self) -> bool {
        !self.lock_cursor().is_over()
    }

    /// Snapshot of the current cursor.
    pub fn cursor(&self) -> Cursor {
        self.lock_cursor().clone()
    }

    /// Start over from the first page.
    pub fn reset(&self) {
        self.lock_cursor().reset();
    }

    /// Fetch the next page. Returns an empty page without touching the store
    /// when `page_size` is zero or the read is exhausted.
    pub async fn more(&self, page_size: usize) -> TableResult<Vec<R>> {
        if page_size == 0 || !self.has_more() {
            return Ok(Vec::new());
        }
        let _guard = self.in_flight.lock().await;

        // Another caller may have exhausted the read while we waited.
        let mut cursor = self.cursor();
        if cursor.is_over() {
            return Ok(Vec::new());
        }
        let page = self.source.fetch(page_size, &mut cursor).await?;
        *self.lock_cursor() = cursor;
        Ok(page)
    }

    /// Stream pages until the read is exhausted.
    pub fn into_stream(
        self,
        page_size: usize,
    ) -> Pin<Box<dyn Stream<Item = TableResult<Vec<R>>> + Send>> {
        let stream = async_stream::try_stream! {
            if page_size > 0 {
                while self.has_more() {
                    let page = self.more(page_size).await?;
                    yield page;
                }
            }
        };
        Box::pin(stream)
    }
}
