//! Local filesystem document store backend.
//!
//! Each physical table is a single JSON document `{root}/{table}.json`
//! holding the key schema and every row. Tables are loaded on first use and
//! rewritten atomically after every mutation.

use crate::backends::memory::{TableData, TableFile};
use crate::error::{StoreError, StoreResult};
use crate::traits::{
    AttributeUpdate, DocumentStore, Item, Key, Page, QueryRequest, ScanRequest, TableSchema,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

/// Filesystem-backed document store.
pub struct FilesystemStore {
    root: PathBuf,
    tables: Mutex<HashMap<String, TableData>>,
}

impl FilesystemStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            tables: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a table name to its file, rejecting names that could escape the root.
    fn table_path(&self, table: &str) -> StoreResult<PathBuf> {
        if table.is_empty()
            || table.starts_with('.')
            || table.contains("..")
            || table.contains('/')
            || table.contains('\\')
            || table.contains('\0')
        {
            return Err(StoreError::InvalidTableName(table.to_string()));
        }
        Ok(self.root.join(format!("{table}.json")))
    }

    /// Read a table file if it exists.
    async fn load(&self, table: &str) -> StoreResult<Option<TableData>> {
        let path = self.table_path(table)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let file: TableFile = serde_json::from_slice(&bytes)?;
        let data = TableData::from_file(file)?;
        tracing::debug!(table = %table, path = %path.display(), "Loaded table from disk");
        Ok(Some(data))
    }

    /// Write a table file atomically: temp file, fsync, rename.
    async fn persist(&self, table: &str, data: &TableData) -> StoreResult<()> {
        let path = self.table_path(table)?;
        let bytes = serde_json::to_vec(&data.to_file())?;

        let temp_path = self
            .root
            .join(format!(".{table}.json.tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }

    /// Ensure `table` is loaded into `tables`, reading it from disk if needed.
    async fn loaded<'a>(
        &self,
        tables: &'a mut HashMap<String, TableData>,
        table: &str,
    ) -> StoreResult<&'a mut TableData> {
        if !tables.contains_key(table) {
            let data = self
                .load(table)
                .await?
                .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
            tables.insert(table.to_string(), data);
        }
        tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    async fn mutate<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut TableData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tables = self.tables.lock().await;
        let data = self.loaded(&mut tables, table).await?;

        // Apply to a copy so a failed write leaves memory consistent with disk.
        let mut updated = data.clone();
        let result = f(&mut updated)?;
        self.persist(table, &updated).await?;
        *data = updated;
        Ok(result)
    }

    async fn inspect<T>(
        &self,
        table: &str,
        f: impl FnOnce(&TableData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tables = self.tables.lock().await;
        let data = self.loaded(&mut tables, table).await?;
        f(data)
    }
}

#[async_trait]
impl DocumentStore for FilesystemStore {
    #[instrument(skip(self, schema), fields(backend = "filesystem"))]
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.contains_key(table) {
            return Ok(());
        }
        if let Some(data) = self.load(table).await? {
            if data.schema() != schema {
                tracing::warn!(
                    table = %table,
                    "Table already exists with a different schema, keeping existing schema"
                );
            }
            tables.insert(table.to_string(), data);
            return Ok(());
        }

        let data = TableData::new(schema.clone());
        self.persist(table, &data).await?;
        tables.insert(table.to_string(), data);
        tracing::debug!(table = %table, "Created table");
        Ok(())
    }

    #[instrument(skip(self, key), fields(backend = "filesystem"))]
    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Item>> {
        self.inspect(table, |data| data.get(key)).await
    }

    #[instrument(skip(self, item), fields(backend = "filesystem"))]
    async fn put(&self, table: &str, item: Item) -> StoreResult<()> {
        self.mutate(table, |data| data.put(item)).await
    }

    #[instrument(skip(self, key, updates), fields(backend = "filesystem", updates = updates.len()))]
    async fn update(
        &self,
        table: &str,
        key: &Key,
        updates: Vec<AttributeUpdate>,
    ) -> StoreResult<()> {
        self.mutate(table, |data| data.update(key, updates)).await
    }

    #[instrument(skip(self, key), fields(backend = "filesystem"))]
    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        self.mutate(table, |data| data.delete(key)).await
    }

    #[instrument(skip(self, request), fields(backend = "filesystem", limit = ?request.limit))]
    async fn query(&self, table: &str, request: QueryRequest) -> StoreResult<Page> {
        self.inspect(table, |data| data.query(&request)).await
    }

    #[instrument(skip(self, request), fields(backend = "filesystem", limit = ?request.limit))]
    async fn scan(&self, table: &str, request: ScanRequest) -> StoreResult<Page> {
        self.inspect(table, |data| data.scan(&request)).await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StoreResult<()> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(StoreError::Config(format!(
                "store root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}
