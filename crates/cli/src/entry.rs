//! Free-form JSON record used by the CLI.

use satchel_core::ItemId;
use satchel_store::Document;
use satchel_table::{Record, TableResult, TableSpec};
use serde_json::{Value, json};

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    id: ItemId,
    content: Document,
}

impl Entry {
    pub fn new(id: ItemId, content: Document) -> Self {
        Self { id, content }
    }

    pub fn to_json(&self) -> Value {
        json!({"id": self.id, "content": self.content})
    }
}

impl Record for Entry {
    fn spec() -> TableSpec {
        TableSpec::new("entries")
    }

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn to_map(&self) -> Document {
        self.content.clone()
    }

    fn from_map(id: ItemId, content: Document) -> TableResult<Self> {
        Ok(Self { id, content })
    }
}
