use async_trait::async_trait;
use satchel_core::config::AppConfig;
use satchel_core::{ItemId, TenantId};
use satchel_store::{Document, DocumentStore, IndexSchema, MemoryStore};
use satchel_table::{
    CONTENT_COLUMN, Context, ContentCodec, Identity, IdentityProvider, Record, Row, RowCodec,
    TableError, TableResult, TableSpec,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Record with a title and an optional photo asset.
#[derive(Clone, Debug, PartialEq)]
pub struct Leaf {
    id: ItemId,
    pub title: String,
    pub photo: Option<String>,
}

#[allow(dead_code)]
impl Leaf {
    pub fn new(title: &str) -> Self {
        Self::with_id(ItemId::random().as_str(), title)
    }

    pub fn with_id(id: &str, title: &str) -> Self {
        Self {
            id: ItemId::new(id),
            title: title.to_string(),
            photo: None,
        }
    }

    pub fn with_photo(mut self, photo: &str) -> Self {
        self.photo = Some(photo.to_string());
        self
    }
}

impl Record for Leaf {
    fn spec() -> TableSpec {
        TableSpec::new("LEAF")
    }

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn to_map(&self) -> Document {
        let mut map = Document::new();
        map.insert("title".to_string(), json!(self.title));
        if let Some(photo) = &self.photo {
            map.insert("photo".to_string(), json!(photo));
        }
        map
    }

    fn from_map(id: ItemId, content: Document) -> TableResult<Self> {
        let title = content
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| TableError::Codec("leaf without title".to_string()))?;
        Ok(Self {
            id,
            title: title.to_string(),
            photo: content
                .get("photo")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn assets(&self) -> Vec<String> {
        self.photo.iter().cloned().collect()
    }
}

/// Second record type, for multi-table tests.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    id: ItemId,
    pub body: String,
}

#[allow(dead_code)]
impl Note {
    pub fn with_id(id: &str, body: &str) -> Self {
        Self {
            id: ItemId::new(id),
            body: body.to_string(),
        }
    }
}

impl Record for Note {
    fn spec() -> TableSpec {
        TableSpec::new("NOTE")
    }

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn to_map(&self) -> Document {
        let mut map = Document::new();
        map.insert("body".to_string(), json!(self.body));
        map
    }

    fn from_map(id: ItemId, content: Document) -> TableResult<Self> {
        Ok(Self {
            id,
            body: content
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Content codec that also projects the title into a top-level column so
/// it can serve as an index sort key.
#[derive(Default)]
pub struct TitledCodec {
    inner: ContentCodec<Leaf>,
}

#[async_trait]
impl RowCodec<Leaf> for TitledCodec {
    async fn read(&self, mut row: Row) -> TableResult<Option<Leaf>> {
        row.attributes.remove("title");
        self.inner.read(row).await
    }

    async fn write(&self, record: &Leaf) -> TableResult<Document> {
        let mut attributes = self.inner.write(record).await?;
        attributes.insert("title".to_string(), json!(record.title));
        debug_assert!(attributes.contains_key(CONTENT_COLUMN));
        Ok(attributes)
    }
}

#[allow(dead_code)]
pub fn leaf_spec_with_title_index() -> TableSpec {
    Leaf::spec().with_index(IndexSchema::new(
        "by-title",
        "tenantId",
        Some("title".to_string()),
    ))
}

/// Context over a fresh in-memory store with the given tenant id.
#[allow(dead_code)]
pub fn context(tenant: &str) -> Context {
    context_with(Arc::new(MemoryStore::new()), tenant, AppConfig::for_testing())
}

#[allow(dead_code)]
pub fn context_with(store: Arc<dyn DocumentStore>, tenant: &str, config: AppConfig) -> Context {
    let identity = IdentityProvider::new(Identity::new(TenantId::new(tenant), Vec::new()));
    Context::new(config, store, Arc::new(identity))
}
