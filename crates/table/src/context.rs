//! Explicit application context: one store, one identity provider and one
//! shared table per physical name.

use crate::assets::AssetStore;
use crate::codec::{AssetCheckedCodec, ContentCodec, RowCodec};
use crate::error::{TableError, TableResult};
use crate::identity::IdentityProvider;
use crate::record::Record;
use crate::table::{PhysicalTable, Table, TableSpec};
use satchel_core::AppConfig;
use satchel_store::DocumentStore;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type TableEntry = Arc<dyn Any + Send + Sync>;

pub struct Context {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    identity: Arc<IdentityProvider>,
    assets: Option<Arc<dyn AssetStore>>,
    tables: Mutex<HashMap<String, TableEntry>>,
}

impl Context {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        identity: Arc<IdentityProvider>,
    ) -> Self {
        Self {
            config,
            store,
            identity,
            assets: None,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Validate the configuration and build the store and identity it names.
    pub async fn from_config(config: AppConfig) -> TableResult<Self> {
        config.validate()?;
        let store = satchel_store::from_config(&config.store, &config.retry).await?;
        let identity = Arc::new(IdentityProvider::from_config(&config.identity)?);
        tracing::info!(
            app = %config.app_name,
            backend = store.backend_name(),
            tenant = %identity.tenant_id(),
            "Context initialized"
        );
        Ok(Self::new(config, store, identity))
    }

    /// Attach an asset store. Tables opened through [`Context::table`] then
    /// drop rows whose assets are missing.
    pub fn with_assets(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn identity(&self) -> &Arc<IdentityProvider> {
        &self.identity
    }

    pub fn assets(&self) -> Option<&Arc<dyn AssetStore>> {
        self.assets.as_ref()
    }

    /// The shared table for `R`, opened on first use.
    pub async fn table<R: Record>(&self) -> TableResult<Arc<Table<R>>> {
        let content: Arc<dyn RowCodec<R>> = Arc::new(ContentCodec::<R>::new());
        let codec: Arc<dyn RowCodec<R>> = match &self.assets {
            Some(assets) => Arc::new(AssetCheckedCodec::new(content, assets.clone())),
            None => content,
        };
        self.table_for(R::spec(), codec).await
    }

    /// The shared table for an explicit spec and codec, opened on first use.
    /// The codec is only used when this call opens the table.
    pub async fn table_for<R: Record>(
        &self,
        spec: TableSpec,
        codec: Arc<dyn RowCodec<R>>,
    ) -> TableResult<Arc<Table<R>>> {
        let name = spec.physical_name(&self.config.app_name);
        let mut tables = self.tables.lock().await;

        if let Some(entry) = tables.get(&name) {
            return entry.clone().downcast::<Table<R>>().map_err(|_| {
                TableError::Config(format!(
                    "table {name} is already open with a different record type"
                ))
            });
        }

        let physical = PhysicalTable::open(self.store.clone(), spec, &self.config.app_name).await?;
        let table = Arc::new(Table::new(
            Arc::new(physical),
            self.identity.clone(),
            codec,
            self.config.paging.migration_page_size,
        ));
        tables.insert(name, table.clone());
        Ok(table)
    }

    pub async fn open_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}
