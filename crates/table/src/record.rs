//! The contract every persisted entity implements.

use crate::context::Context;
use crate::error::{TableError, TableResult};
use crate::table::TableSpec;
use async_trait::async_trait;
use satchel_core::ItemId;
use satchel_store::Document;

/// A stored entity: an immutable id plus a serializable content map.
///
/// The tenant scope is not part of the record; it is injected by the table
/// on every read and write. `Clone` is the deep copy taken before mutating a
/// shared list so readers of the old copy are unaffected.
pub trait Record: Clone + Send + Sync + 'static {
    /// Logical table this record type lives in.
    fn spec() -> TableSpec;

    fn id(&self) -> &ItemId;

    /// Content payload, excluding key columns.
    fn to_map(&self) -> Document;

    /// Rebuild a record from its id and content payload.
    fn from_map(id: ItemId, content: Document) -> TableResult<Self>;

    /// Whether writing `other` over `self` would change anything.
    fn is_need_update(&self, other: &Self) -> bool {
        self.id() != other.id() || self.to_map() != other.to_map()
    }

    /// Keys of out-of-band assets owned by this record.
    fn assets(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Convenience operations delegating to the record's table in a [`Context`].
#[async_trait]
pub trait RecordExt: Record {
    async fn add(&self, ctx: &Context) -> TableResult<()> {
        ctx.table::<Self>().await?.put(self).await
    }

    /// Remove the row, then every asset the record owns.
    ///
    /// The row goes first so a failure never leaves a row pointing at deleted
    /// assets. Asset deletion keeps going past individual failures and
    /// reports the first one.
    async fn remove(&self, ctx: &Context) -> TableResult<()> {
        let table = ctx.table::<Self>().await?;
        table.remove(self.id()).await?;

        let assets = self.assets();
        if assets.is_empty() {
            return Ok(());
        }
        let store = ctx.assets().ok_or_else(|| {
            TableError::Asset(format!(
                "record {} owns {} assets but no asset store is configured",
                self.id(),
                assets.len()
            ))
        })?;

        let mut first_error = None;
        for asset in assets {
            if let Err(e) = store.delete(&asset).await {
                tracing::warn!(
                    table = %table.name(),
                    item = %self.id(),
                    asset = %asset,
                    error = %e,
                    "Failed to delete asset of removed record"
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Write `dst` over this record if its content differs. Returns whether
    /// an update was issued.
    async fn update(&self, ctx: &Context, dst: &Self) -> TableResult<bool> {
        if !self.is_need_update(dst) {
            return Ok(false);
        }
        ctx.table::<Self>().await?.update(dst).await?;
        Ok(true)
    }
}

impl<R: Record> RecordExt for R {}
