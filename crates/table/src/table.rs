//! Tenant-scoped typed tables.
//!
//! A [`PhysicalTable`] knows the key layout of one store table and builds full
//! keys from an explicit tenant id. A [`Table`] adds a record codec and the
//! current identity, so every operation is scoped to the current tenant.

use crate::codec::{Row, RowCodec};
use crate::cursor::Cursor;
use crate::error::{TableError, TableResult};
use crate::identity::{HookRegistration, IdentityProvider};
use crate::migration::MigrationHook;
use crate::pager::{Pager, QuerySource, ScanSource};
use crate::record::Record;
use satchel_core::{ItemId, TenantId};
use satchel_store::{
    AttributeUpdate, DocumentStore, Expression, IndexSchema, Item, Key, Page, QueryRequest,
    ScanRequest, TableSchema,
};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_TENANT_COLUMN: &str = "tenantId";
pub const DEFAULT_ITEM_COLUMN: &str = "id";

/// Logical table definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub tenant_column: String,
    /// `None` for singleton tables holding one row per tenant.
    pub item_column: Option<String>,
    pub indexes: Vec<IndexSchema>,
}

impl TableSpec {
    /// A table keyed by tenant id and item id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant_column: DEFAULT_TENANT_COLUMN.to_string(),
            item_column: Some(DEFAULT_ITEM_COLUMN.to_string()),
            indexes: Vec::new(),
        }
    }

    /// A table keyed by tenant id only.
    pub fn singleton(name: impl Into<String>) -> Self {
        Self {
            item_column: None,
            ..Self::new(name)
        }
    }

    pub fn with_tenant_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_column = column.into();
        self
    }

    pub fn with_item_column(mut self, column: impl Into<String>) -> Self {
        self.item_column = Some(column.into());
        self
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn is_singleton(&self) -> bool {
        self.item_column.is_none()
    }

    /// `"{app_name}.{name}"`
    pub fn physical_name(&self, app_name: &str) -> String {
        format!("{app_name}.{}", self.name)
    }

    /// Store key schema for this table.
    pub fn schema(&self) -> TableSchema {
        self.indexes.iter().cloned().fold(
            TableSchema::new(self.tenant_column.clone(), self.item_column.clone()),
            TableSchema::with_index,
        )
    }
}

/// Untyped access to one physical table with explicit tenant ids.
pub struct PhysicalTable {
    name: String,
    spec: TableSpec,
    store: Arc<dyn DocumentStore>,
}

impl PhysicalTable {
    /// Bind to `"{app_name}.{spec.name}"`, creating the table if needed.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        spec: TableSpec,
        app_name: &str,
    ) -> TableResult<Self> {
        let name = spec.physical_name(app_name);
        store.ensure_table(&name, &spec.schema()).await?;
        tracing::debug!(table = %name, backend = store.backend_name(), "Opened table");
        Ok(Self { name, spec, store })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Full key of a row.
    pub fn key(&self, tenant: &TenantId, item: Option<&ItemId>) -> TableResult<Key> {
        let mut key = Key::new();
        key.insert(
            self.spec.tenant_column.clone(),
            Value::String(tenant.to_string()),
        );
        if let Some(column) = &self.spec.item_column {
            let item = item.ok_or_else(|| TableError::MissingItemId(self.name.clone()))?;
            key.insert(column.clone(), Value::String(item.to_string()));
        }
        Ok(key)
    }

    /// Primary key of a stored item.
    pub fn key_of(&self, item: &Item) -> Key {
        self.spec.schema().key_of(item)
    }

    /// Split a stored item into its key and remaining attributes.
    pub fn split(&self, mut item: Item) -> TableResult<Row> {
        let tenant_id = match item.remove(&self.spec.tenant_column) {
            Some(Value::String(id)) => TenantId::parse(&id)?,
            other => {
                return Err(TableError::Codec(format!(
                    "row in {} has no valid '{}' column: {other:?}",
                    self.name, self.spec.tenant_column
                )));
            }
        };
        let item_id = match &self.spec.item_column {
            Some(column) => match item.remove(column) {
                Some(Value::String(id)) => Some(ItemId::parse(&id)?),
                Some(Value::Number(n)) => Some(ItemId::parse(&n.to_string())?),
                _ => return Err(TableError::MissingItemId(self.name.clone())),
            },
            None => None,
        };
        Ok(Row {
            tenant_id,
            item_id,
            attributes: item,
        })
    }

    /// Key condition matching `tenant` plus any extra equality pairs.
    /// Pairs naming the tenant column are ignored so a query can never leave
    /// its tenant's partition.
    pub fn tenant_condition(&self, tenant: &TenantId, keys: &[(String, Value)]) -> Expression {
        let tenant_pair = (
            self.spec.tenant_column.clone(),
            Value::String(tenant.to_string()),
        );
        let extra = keys
            .iter()
            .filter(|(name, _)| *name != self.spec.tenant_column)
            .cloned();
        Expression::join_all(std::iter::once(tenant_pair).chain(extra))
    }

    /// `filter` restricted to the rows of `tenant`.
    pub fn tenant_filter(&self, tenant: &TenantId, filter: &Expression) -> Expression {
        filter.clone().scoped([(
            self.spec.tenant_column.clone(),
            Value::String(tenant.to_string()),
        )])
    }

    /// One page of the base-table partition of `tenant`, as raw items.
    pub async fn query_partition(
        &self,
        tenant: &TenantId,
        page_size: usize,
        start: Option<Key>,
    ) -> TableResult<Page> {
        let mut request = QueryRequest::new(self.tenant_condition(tenant, &[]));
        request.limit = Some(page_size);
        request.exclusive_start_key = start;
        Ok(self.store.query(&self.name, request).await?)
    }
}

/// Options for [`Table::query`].
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Equality conditions added to the tenant id.
    pub keys: Vec<(String, Value)>,
    pub index_name: Option<String>,
    pub forward: bool,
    pub page_size: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            index_name: None,
            forward: true,
            page_size: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keys.push((name.into(), value));
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.forward = false;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Typed, tenant-scoped view over one physical table.
///
/// Creating a table registers its migration hook with the identity provider;
/// dropping the table deregisters it.
pub struct Table<R> {
    physical: Arc<PhysicalTable>,
    identity: Arc<IdentityProvider>,
    codec: Arc<dyn RowCodec<R>>,
    _migration: HookRegistration,
}

impl<R: Record> Table<R> {
    pub fn new(
        physical: Arc<PhysicalTable>,
        identity: Arc<IdentityProvider>,
        codec: Arc<dyn RowCodec<R>>,
        migration_page_size: usize,
    ) -> Self {
        let hook = MigrationHook::new(physical.clone(), migration_page_size);
        let registration = identity.on_rotate(Arc::new(hook));
        Self {
            physical,
            identity,
            codec,
            _migration: registration,
        }
    }

    pub fn name(&self) -> &str {
        self.physical.name()
    }

    pub fn spec(&self) -> &TableSpec {
        self.physical.spec()
    }

    pub fn physical(&self) -> &Arc<PhysicalTable> {
        &self.physical
    }

    pub fn identity(&self) -> &Arc<IdentityProvider> {
        &self.identity
    }

    fn key(&self, id: &ItemId) -> TableResult<Key> {
        self.physical.key(&self.identity.tenant_id(), Some(id))
    }

    /// Decode rows, dropping those the reader rejects.
    async fn decode(&self, items: Vec<Item>) -> TableResult<Vec<R>> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let row = self.physical.split(item)?;
            let item_id = row.item_id.clone();
            match self.codec.read(row).await? {
                Some(record) => records.push(record),
                None => tracing::debug!(
                    table = %self.name(),
                    item = ?item_id,
                    "Reader rejected row, skipping"
                ),
            }
        }
        Ok(records)
    }

    /// Fetch one record of the current tenant. Returns `None` if the row is
    /// absent or the reader rejects it.
    pub async fn get(&self, id: &ItemId) -> TableResult<Option<R>> {
        let key = self.key(id)?;
        let Some(item) = self.physical.store().get(self.name(), &key).await? else {
            return Ok(None);
        };
        let row = self.physical.split(item)?;
        self.codec.read(row).await
    }

    /// Write a record unconditionally, overwriting any existing row.
    pub async fn put(&self, record: &R) -> TableResult<()> {
        let mut item = self.codec.write(record).await?;
        item.extend(self.key(record.id())?);
        self.physical.store().put(self.name(), item).await?;
        Ok(())
    }

    /// Overwrite the non-key columns of an existing row. Fails with
    /// `NotFound` if the row does not exist.
    pub async fn update(&self, record: &R) -> TableResult<()> {
        let key = self.key(record.id())?;
        let mut attributes = self.codec.write(record).await?;
        attributes.remove(&self.spec().tenant_column);
        if let Some(column) = &self.spec().item_column {
            attributes.remove(column);
        }
        let updates = attributes
            .into_iter()
            .map(|(name, value)| AttributeUpdate::put(name, value))
            .collect();
        self.physical
            .store()
            .update(self.name(), &key, updates)
            .await?;
        Ok(())
    }

    /// Delete a row of the current tenant. Assets are not touched.
    pub async fn remove(&self, id: &ItemId) -> TableResult<()> {
        let key = self.key(id)?;
        self.physical.store().delete(self.name(), &key).await?;
        Ok(())
    }

    /// Query the current tenant's partition.
    ///
    /// When a cursor is supplied the read resumes from it and the cursor is
    /// updated from the store response. Rows rejected by the reader are
    /// dropped, so a page may be short even though more rows remain.
    pub async fn query(
        &self,
        options: &QueryOptions,
        cursor: Option<&mut Cursor>,
    ) -> TableResult<Vec<R>> {
        if options.page_size == Some(0) || cursor.as_ref().is_some_and(|c| c.is_over()) {
            return Ok(Vec::new());
        }
        let tenant = self.identity.tenant_id();
        let mut request = QueryRequest::new(self.physical.tenant_condition(&tenant, &options.keys));
        request.index_name = options.index_name.clone();
        request.scan_index_forward = options.forward;
        request.limit = options.page_size;
        request.exclusive_start_key = cursor.as_ref().and_then(|c| c.exclusive_start());

        let page = self.physical.store().query(self.name(), request).await?;
        self.finish_page(page, cursor).await
    }

    /// Scan the current tenant's rows with a store-side filter instead of a
    /// key condition. An empty filter matches every row of the tenant. Paging
    /// behaves as in [`Table::query`].
    pub async fn scan(
        &self,
        filter: &Expression,
        page_size: Option<usize>,
        cursor: Option<&mut Cursor>,
    ) -> TableResult<Vec<R>> {
        if page_size == Some(0) || cursor.as_ref().is_some_and(|c| c.is_over()) {
            return Ok(Vec::new());
        }
        let request = ScanRequest {
            filter: Some(self.physical.tenant_filter(&self.identity.tenant_id(), filter)),
            limit: page_size,
            exclusive_start_key: cursor.as_ref().and_then(|c| c.exclusive_start()),
        };

        let page = self.physical.store().scan(self.name(), request).await?;
        self.finish_page(page, cursor).await
    }

    /// Decode a page, then advance the cursor. A decode failure leaves the
    /// cursor where it was so the page can be read again.
    async fn finish_page(&self, page: Page, cursor: Option<&mut Cursor>) -> TableResult<Vec<R>> {
        let records = self.decode(page.items).await?;
        if let Some(cursor) = cursor {
            cursor.set(page.last_evaluated_key);
        }
        Ok(records)
    }

    pub fn query_pager(self: &Arc<Self>, options: QueryOptions) -> Pager<R> {
        Pager::new(Arc::new(QuerySource::new(self.clone(), options)))
    }

    pub fn scan_pager(self: &Arc<Self>, filter: Expression) -> Pager<R> {
        Pager::new(Arc::new(ScanSource::new(self.clone(), filter)))
    }
}
