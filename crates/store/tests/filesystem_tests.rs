// Persistence tests for the filesystem backend.

mod common;

use common::{item, leaf_schema, seed_rows};
use satchel_store::{DocumentStore, Expression, FilesystemStore, QueryRequest, StoreError};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const TABLE: &str = "test.LEAF";

#[tokio::test]
async fn test_rows_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = FilesystemStore::new(temp.path()).await.unwrap();
        store.ensure_table(TABLE, &leaf_schema()).await.unwrap();
        seed_rows(&store, TABLE, "t1", 3).await;
    }

    let reopened = FilesystemStore::new(temp.path()).await.unwrap();
    // Reads load the table lazily without an explicit ensure_table.
    let row = reopened
        .get(TABLE, &item(json!({"tenantId": "t1", "id": "id-001"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["content"]["n"], json!(1));

    let page = reopened
        .query(
            TABLE,
            QueryRequest::new(Expression::join_all([("tenantId", json!("t1"))])),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn test_failed_write_leaves_table_unchanged() {
    let temp = TempDir::new().unwrap();
    let store = FilesystemStore::new(temp.path()).await.unwrap();
    store.ensure_table(TABLE, &leaf_schema()).await.unwrap();
    seed_rows(&store, TABLE, "t1", 1).await;

    let err = store
        .put(TABLE, item(json!({"tenantId": "t1"})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidItem(_)));

    let reopened = FilesystemStore::new(temp.path()).await.unwrap();
    let page = reopened
        .query(
            TABLE,
            QueryRequest::new(Expression::join_all([("tenantId", json!("t1"))])),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn test_concurrent_puts_are_all_persisted() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FilesystemStore::new(temp.path()).await.unwrap());
    store.ensure_table(TABLE, &leaf_schema()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .put(
                    TABLE,
                    item(json!({"tenantId": "t1", "id": format!("id-{i:03}")})),
                )
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let reopened = FilesystemStore::new(temp.path()).await.unwrap();
    let page = reopened
        .query(
            TABLE,
            QueryRequest::new(Expression::join_all([("tenantId", json!("t1"))])),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 20);

    // No temp files left behind.
    let leftovers = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
        .count();
    assert_eq!(leftovers, 0);
}
