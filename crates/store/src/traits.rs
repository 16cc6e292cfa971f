//! Document store trait definitions.

use crate::error::StoreResult;
use crate::expression::Expression;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A schemaless document: attribute name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// A stored row. Always carries the table's key attributes.
pub type Item = Document;

/// The key attributes identifying one row (or one position in a listing).
pub type Key = Document;

/// Key schema of a physical table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Partition (hash) key attribute.
    pub partition_key: String,
    /// Optional sort (range) key attribute.
    pub sort_key: Option<String>,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(partition_key: impl Into<String>, sort_key: Option<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up a secondary index by name.
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Attribute names making up the primary key.
    pub fn key_attributes(&self) -> Vec<&str> {
        let mut attrs = vec![self.partition_key.as_str()];
        if let Some(sort_key) = &self.sort_key {
            attrs.push(sort_key.as_str());
        }
        attrs
    }

    /// Project the primary key out of an item.
    pub fn key_of(&self, item: &Item) -> Key {
        let mut key = Key::new();
        for attr in self.key_attributes() {
            if let Some(value) = item.get(attr) {
                key.insert(attr.to_string(), value.clone());
            }
        }
        key
    }
}

/// Secondary index definition. Rows lacking the index partition attribute are
/// not part of the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl IndexSchema {
    pub fn new(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key,
        }
    }
}

/// Column-level update action.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeUpdate {
    /// Replace (or add) the attribute with the given value.
    Put { name: String, value: Value },
}

impl AttributeUpdate {
    pub fn put(name: impl Into<String>, value: Value) -> Self {
        Self::Put {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Put { name, .. } => name,
        }
    }
}

/// A key-condition query against a table or one of its indexes.
#[derive(Clone, Debug)]
pub struct QueryRequest {
    /// Key condition with its placeholder bindings.
    pub key_condition: Expression,
    /// Optional filter applied after the key condition and the limit.
    pub filter: Option<Expression>,
    /// Secondary index to query instead of the base table.
    pub index_name: Option<String>,
    /// Maximum number of rows evaluated.
    pub limit: Option<usize>,
    /// Resume strictly after this position.
    pub exclusive_start_key: Option<Key>,
    /// Ascending sort-key order when true.
    pub scan_index_forward: bool,
}

impl QueryRequest {
    pub fn new(key_condition: Expression) -> Self {
        Self {
            key_condition,
            filter: None,
            index_name: None,
            limit: None,
            exclusive_start_key: None,
            scan_index_forward: true,
        }
    }
}

/// A full-table read with an optional store-side filter.
#[derive(Clone, Debug, Default)]
pub struct ScanRequest {
    pub filter: Option<Expression>,
    /// Maximum number of rows evaluated (before filtering).
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Key>,
}

/// One page of query or scan results.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// Position to resume from. `None` when no rows remain.
    pub last_evaluated_key: Option<Key>,
}

/// Document store abstraction: the narrow capability set the table layer needs.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Create the table with the given key schema if it does not already exist.
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()>;

    /// Fetch one row by primary key.
    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Item>>;

    /// Write a row unconditionally, replacing any row with the same key.
    async fn put(&self, table: &str, item: Item) -> StoreResult<()>;

    /// Apply column-level updates to an existing row. Never creates the row.
    async fn update(
        &self,
        table: &str,
        key: &Key,
        updates: Vec<AttributeUpdate>,
    ) -> StoreResult<()>;

    /// Delete a row. Deleting an absent row is not an error.
    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()>;

    /// Query by key condition.
    async fn query(&self, table: &str, request: QueryRequest) -> StoreResult<Page>;

    /// Scan the whole table.
    async fn scan(&self, table: &str, request: ScanRequest) -> StoreResult<Page>;

    /// Static identifier of the backend type, used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
