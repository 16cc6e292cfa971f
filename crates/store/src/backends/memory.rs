//! In-memory document store backend.
//!
//! [`TableData`] holds one table's rows and implements the key, ordering and
//! paging semantics shared by every local backend.

use crate::error::{StoreError, StoreResult};
use crate::eval::{Condition, total_order};
use crate::traits::{
    AttributeUpdate, DocumentStore, Item, Key, Page, QueryRequest, ScanRequest, TableSchema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;
use tracing::instrument;

/// Primary key of a row, ordered by partition then sort value.
#[derive(Clone, Debug)]
pub(crate) struct RowKey(Option<Value>, Option<Value>);

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        total_order(self.0.as_ref(), other.0.as_ref())
            .then_with(|| total_order(self.1.as_ref(), other.1.as_ref()))
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}

/// Serialized form of a table, used by the filesystem backend.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TableFile {
    pub(crate) schema: TableSchema,
    pub(crate) items: Vec<Item>,
}

/// Rows of one table plus its key schema.
#[derive(Clone, Debug)]
pub(crate) struct TableData {
    schema: TableSchema,
    rows: BTreeMap<RowKey, Item>,
}

impl TableData {
    pub(crate) fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    pub(crate) fn from_file(file: TableFile) -> StoreResult<Self> {
        let mut data = Self::new(file.schema);
        for item in file.items {
            data.put(item)?;
        }
        Ok(data)
    }

    pub(crate) fn to_file(&self) -> TableFile {
        TableFile {
            schema: self.schema.clone(),
            items: self.rows.values().cloned().collect(),
        }
    }

    pub(crate) fn schema(&self) -> &TableSchema {
        &self.schema
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    fn check_key_value(attr: &str, value: Option<&Value>) -> StoreResult<()> {
        match value {
            Some(Value::String(s)) if !s.is_empty() => Ok(()),
            Some(Value::Number(_)) => Ok(()),
            Some(other) => Err(StoreError::InvalidItem(format!(
                "key attribute '{attr}' must be a non-empty string or a number, got {other}"
            ))),
            None => Err(StoreError::InvalidItem(format!(
                "missing key attribute '{attr}'"
            ))),
        }
    }

    /// Build the row key for a full primary key, validating its attributes.
    fn row_key(&self, key: &Key) -> StoreResult<RowKey> {
        let partition = key.get(&self.schema.partition_key);
        Self::check_key_value(&self.schema.partition_key, partition)?;
        let sort = match &self.schema.sort_key {
            Some(attr) => {
                let value = key.get(attr);
                Self::check_key_value(attr, value)?;
                value.cloned()
            }
            None => None,
        };
        Ok(RowKey(partition.cloned(), sort))
    }

    /// Row key for an exclusive start position. Missing attributes sort first.
    fn start_key(&self, key: &Key) -> RowKey {
        RowKey(
            key.get(&self.schema.partition_key).cloned(),
            self.schema
                .sort_key
                .as_ref()
                .and_then(|attr| key.get(attr).cloned()),
        )
    }

    pub(crate) fn get(&self, key: &Key) -> StoreResult<Option<Item>> {
        let row_key = self.row_key(key).map_err(into_request_error)?;
        Ok(self.rows.get(&row_key).cloned())
    }

    pub(crate) fn put(&mut self, item: Item) -> StoreResult<()> {
        let row_key = self.row_key(&item)?;
        self.rows.insert(row_key, item);
        Ok(())
    }

    pub(crate) fn update(&mut self, key: &Key, updates: Vec<AttributeUpdate>) -> StoreResult<()> {
        let row_key = self.row_key(key).map_err(into_request_error)?;
        let key_attrs = self.schema.key_attributes();
        if let Some(update) = updates
            .iter()
            .find(|u| key_attrs.contains(&u.name()))
        {
            return Err(StoreError::InvalidRequest(format!(
                "cannot update key attribute '{}'",
                update.name()
            )));
        }

        let row = self
            .rows
            .get_mut(&row_key)
            .ok_or_else(|| StoreError::NotFound(Value::Object(key.clone()).to_string()))?;
        for AttributeUpdate::Put { name, value } in updates {
            row.insert(name, value);
        }
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: &Key) -> StoreResult<()> {
        let row_key = self.row_key(key).map_err(into_request_error)?;
        self.rows.remove(&row_key);
        Ok(())
    }

    pub(crate) fn query(&self, request: &QueryRequest) -> StoreResult<Page> {
        check_limit(request.limit)?;
        let key_condition = Condition::parse(&request.key_condition)?;
        if key_condition == Condition::Always {
            return Err(StoreError::InvalidRequest(
                "query requires a key condition".to_string(),
            ));
        }
        let filter = request
            .filter
            .as_ref()
            .map(Condition::parse)
            .transpose()?;

        // Attributes defining the listing order, most significant first.
        let mut order_attrs: Vec<&str> = Vec::new();
        let mut required_attrs: Vec<&str> = Vec::new();
        match &request.index_name {
            Some(name) => {
                let index = self.schema.index(name).ok_or_else(|| {
                    StoreError::InvalidRequest(format!("unknown index '{name}'"))
                })?;
                order_attrs.push(index.partition_key.as_str());
                required_attrs.push(index.partition_key.as_str());
                if let Some(sort_key) = &index.sort_key {
                    order_attrs.push(sort_key.as_str());
                    required_attrs.push(sort_key.as_str());
                }
            }
            None => required_attrs.push(self.schema.partition_key.as_str()),
        }
        order_attrs.extend(self.schema.key_attributes());

        let position = |item: &Item| -> Vec<Option<Value>> {
            order_attrs.iter().map(|a| item.get(*a).cloned()).collect()
        };
        let compare = |a: &[Option<Value>], b: &[Option<Value>]| -> Ordering {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| total_order(x.as_ref(), y.as_ref()))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        };

        let mut candidates: Vec<(Vec<Option<Value>>, &Item)> = self
            .rows
            .values()
            .filter(|item| required_attrs.iter().all(|a| item.contains_key(*a)))
            .filter(|item| key_condition.matches(item))
            .map(|item| (position(item), item))
            .collect();
        candidates.sort_by(|a, b| compare(&a.0, &b.0));
        if !request.scan_index_forward {
            candidates.reverse();
        }

        let start = match &request.exclusive_start_key {
            Some(start_key) => {
                let start_pos = position(start_key);
                let past = if request.scan_index_forward {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                candidates
                    .iter()
                    .position(|(pos, _)| compare(pos, &start_pos) == past)
                    .unwrap_or(candidates.len())
            }
            None => 0,
        };

        let remaining = &candidates[start..];
        let take = request.limit.unwrap_or(remaining.len()).min(remaining.len());
        let evaluated = &remaining[..take];

        let last_evaluated_key = if take < remaining.len() {
            evaluated.last().map(|(_, item)| {
                let mut key = Key::new();
                for attr in order_attrs.iter() {
                    if let Some(value) = item.get(*attr) {
                        key.insert(attr.to_string(), value.clone());
                    }
                }
                key
            })
        } else {
            None
        };

        let items = evaluated
            .iter()
            .map(|(_, item)| *item)
            .filter(|item| filter.as_ref().is_none_or(|f| f.matches(item)))
            .cloned()
            .collect();

        Ok(Page {
            items,
            last_evaluated_key,
        })
    }

    pub(crate) fn scan(&self, request: &ScanRequest) -> StoreResult<Page> {
        check_limit(request.limit)?;
        let filter = request
            .filter
            .as_ref()
            .map(Condition::parse)
            .transpose()?;

        let lower = match &request.exclusive_start_key {
            Some(key) => Bound::Excluded(self.start_key(key)),
            None => Bound::Unbounded,
        };
        let mut rows = self.rows.range((lower, Bound::Unbounded)).peekable();

        let limit = request.limit.unwrap_or(usize::MAX);
        let mut items = Vec::new();
        let mut last_key = None;
        let mut evaluated = 0;
        while evaluated < limit {
            let Some((_, item)) = rows.next() else {
                break;
            };
            evaluated += 1;
            last_key = Some(self.schema.key_of(item));
            if filter.as_ref().is_none_or(|f| f.matches(item)) {
                items.push(item.clone());
            }
        }

        let last_evaluated_key = if rows.peek().is_some() {
            last_key
        } else {
            None
        };

        Ok(Page {
            items,
            last_evaluated_key,
        })
    }
}

fn check_limit(limit: Option<usize>) -> StoreResult<()> {
    if limit == Some(0) {
        return Err(StoreError::InvalidRequest(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// A malformed key in a request is a request error, not an item error.
fn into_request_error(err: StoreError) -> StoreError {
    match err {
        StoreError::InvalidItem(msg) => StoreError::InvalidRequest(msg),
        other => other,
    }
}

/// Process-local document store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, TableData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(
        &self,
        table: &str,
        f: impl FnOnce(&TableData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let tables = self.tables.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        });
        let data = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        f(data)
    }

    fn write<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut TableData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tables = self.tables.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        });
        let data = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        f(data)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[instrument(skip(self, schema), fields(backend = "memory"))]
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        });
        if let Some(existing) = tables.get(table) {
            if existing.schema() != schema {
                tracing::warn!(
                    table = %table,
                    "Table already exists with a different schema, keeping existing schema"
                );
            }
            return Ok(());
        }
        tables.insert(table.to_string(), TableData::new(schema.clone()));
        tracing::debug!(table = %table, "Created table");
        Ok(())
    }

    #[instrument(skip(self, key), fields(backend = "memory"))]
    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Item>> {
        self.read(table, |data| data.get(key))
    }

    #[instrument(skip(self, item), fields(backend = "memory"))]
    async fn put(&self, table: &str, item: Item) -> StoreResult<()> {
        self.write(table, |data| data.put(item))
    }

    #[instrument(skip(self, key, updates), fields(backend = "memory", updates = updates.len()))]
    async fn update(
        &self,
        table: &str,
        key: &Key,
        updates: Vec<AttributeUpdate>,
    ) -> StoreResult<()> {
        self.write(table, |data| data.update(key, updates))
    }

    #[instrument(skip(self, key), fields(backend = "memory"))]
    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        self.write(table, |data| data.delete(key))
    }

    #[instrument(skip(self, request), fields(backend = "memory", limit = ?request.limit))]
    async fn query(&self, table: &str, request: QueryRequest) -> StoreResult<Page> {
        self.read(table, |data| data.query(&request))
    }

    #[instrument(skip(self, request), fields(backend = "memory", limit = ?request.limit))]
    async fn scan(&self, table: &str, request: ScanRequest) -> StoreResult<Page> {
        self.read(table, |data| data.scan(&request))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
