//! Conversion between stored rows and records.
//!
//! A [`RowCodec`] is the reader/writer pair registered with a table. Readers
//! may reject a row by returning `None`, e.g. when an asset it references no
//! longer exists; the table then treats the row as absent.

use crate::assets::AssetStore;
use crate::error::{TableError, TableResult};
use crate::record::Record;
use async_trait::async_trait;
use satchel_core::{ItemId, TenantId};
use satchel_store::Document;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Column holding a record's content payload.
pub const CONTENT_COLUMN: &str = "content";

/// A stored row split into its key and its remaining attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub tenant_id: TenantId,
    /// `None` for singleton tables.
    pub item_id: Option<ItemId>,
    /// Every attribute except the key columns.
    pub attributes: Document,
}

#[async_trait]
pub trait RowCodec<R>: Send + Sync {
    async fn read(&self, row: Row) -> TableResult<Option<R>>;

    /// Serialize the non-key attributes of a record.
    async fn write(&self, record: &R) -> TableResult<Document>;
}

/// Stores [`Record::to_map`] under the `content` column.
pub struct ContentCodec<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> ContentCodec<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for ContentCodec<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RowCodec<R> for ContentCodec<R> {
    async fn read(&self, mut row: Row) -> TableResult<Option<R>> {
        let content = match row.attributes.remove(CONTENT_COLUMN) {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Document::new(),
            Some(other) => {
                return Err(TableError::Codec(format!(
                    "'{CONTENT_COLUMN}' column must be a map, got {other}"
                )));
            }
        };
        // Singleton rows have no item column; their record is named after the table.
        let id = row.item_id.unwrap_or_else(|| ItemId::new(R::spec().name));
        R::from_map(id, content).map(Some)
    }

    async fn write(&self, record: &R) -> TableResult<Document> {
        let mut attributes = Document::new();
        attributes.insert(CONTENT_COLUMN.to_string(), Value::Object(record.to_map()));
        Ok(attributes)
    }
}

/// Wraps a codec so rows whose assets are missing read as absent.
pub struct AssetCheckedCodec<R> {
    inner: Arc<dyn RowCodec<R>>,
    assets: Arc<dyn AssetStore>,
}

impl<R> AssetCheckedCodec<R> {
    pub fn new(inner: Arc<dyn RowCodec<R>>, assets: Arc<dyn AssetStore>) -> Self {
        Self { inner, assets }
    }
}

#[async_trait]
impl<R: Record> RowCodec<R> for AssetCheckedCodec<R> {
    async fn read(&self, row: Row) -> TableResult<Option<R>> {
        let Some(record) = self.inner.read(row).await? else {
            return Ok(None);
        };
        for asset in record.assets() {
            if !self.assets.exists(&asset).await? {
                tracing::debug!(
                    item = %record.id(),
                    asset = %asset,
                    "Dropping row whose asset no longer exists"
                );
                return Ok(None);
            }
        }
        Ok(Some(record))
    }

    async fn write(&self, record: &R) -> TableResult<Document> {
        self.inner.write(record).await
    }
}
