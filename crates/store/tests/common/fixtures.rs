use satchel_store::{DocumentStore, IndexSchema, Item, TableSchema};
use serde_json::{Value, json};

/// Build an item from a JSON object literal.
pub fn item(value: Value) -> Item {
    value
        .as_object()
        .cloned()
        .expect("fixture items must be JSON objects")
}

/// Tenant-partitioned schema with an item sort key and a title index.
pub fn leaf_schema() -> TableSchema {
    TableSchema::new("tenantId", Some("id".to_string())).with_index(IndexSchema::new(
        "by-title",
        "tenantId",
        Some("title".to_string()),
    ))
}

/// Insert `count` rows for `tenant` with ids `id-000`.. and descending titles.
#[allow(dead_code)]
pub async fn seed_rows(store: &dyn DocumentStore, table: &str, tenant: &str, count: usize) {
    for i in 0..count {
        store
            .put(
                table,
                item(json!({
                    "tenantId": tenant,
                    "id": format!("id-{i:03}"),
                    "title": format!("title-{:03}", count - i),
                    "content": {"n": i, "tags": if i % 2 == 0 { json!(["even"]) } else { json!(["odd"]) }},
                })),
            )
            .await
            .unwrap();
    }
}
