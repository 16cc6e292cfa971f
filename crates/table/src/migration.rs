//! Relocation of a table's rows when the tenant id rotates.

use crate::error::TableResult;
use crate::identity::RotationHook;
use crate::table::PhysicalTable;
use async_trait::async_trait;
use satchel_core::TenantId;
use satchel_store::Item;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of migrating one table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub table: String,
    pub migrated: usize,
    pub failed: usize,
}

impl MigrationStats {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Rotation hook moving every row of one table from the old tenant id to the
/// new one.
///
/// Rows are moved one at a time: put under the new key, then delete the old
/// row. A failed row is logged and left where it was; if only the delete
/// fails the row exists under both ids.
pub struct MigrationHook {
    table: Arc<PhysicalTable>,
    page_size: usize,
}

impl MigrationHook {
    pub fn new(table: Arc<PhysicalTable>, page_size: usize) -> Self {
        Self {
            table,
            page_size: page_size.max(1),
        }
    }

    /// Read the whole partition of `tenant` before anything is moved, so
    /// rewritten rows never shift the listing being paged through.
    async fn collect(&self, tenant: &TenantId) -> TableResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start = None;
        loop {
            let page = self
                .table
                .query_partition(tenant, self.page_size, start)
                .await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => start = Some(key),
                None => return Ok(items),
            }
        }
    }

    async fn migrate_row(&self, item: Item, new: &TenantId) -> TableResult<()> {
        let old_key = self.table.key_of(&item);
        let mut moved = item;
        moved.insert(
            self.table.spec().tenant_column.clone(),
            Value::String(new.to_string()),
        );
        let store = self.table.store();
        store.put(self.table.name(), moved).await?;
        store.delete(self.table.name(), &old_key).await?;
        Ok(())
    }
}

#[async_trait]
impl RotationHook for MigrationHook {
    async fn on_rotate(&self, old: &TenantId, new: &TenantId) -> MigrationStats {
        let started = Instant::now();
        let mut stats = MigrationStats::new(self.table.name());

        let items = match self.collect(old).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    table = %self.table.name(),
                    old = %old,
                    error = %e,
                    "Failed to list rows for migration, leaving table untouched"
                );
                return stats;
            }
        };

        for item in items {
            let key = Value::Object(self.table.key_of(&item));
            match self.migrate_row(item, new).await {
                Ok(()) => stats.migrated += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        table = %self.table.name(),
                        key = %key,
                        error = %e,
                        "Failed to migrate row to new tenant id"
                    );
                }
            }
        }

        tracing::info!(
            table = %self.table.name(),
            old = %old,
            new = %new,
            migrated = stats.migrated,
            failed = stats.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tenant migration completed"
        );
        stats
    }
}
