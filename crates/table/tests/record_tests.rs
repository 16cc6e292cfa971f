mod common;

use common::{Leaf, context};
use satchel_table::{AssetStore, MemoryAssetStore, Record, RecordExt, TableError};
use std::sync::Arc;

#[test]
fn test_clone_is_equivalent_but_independent() {
    let original = Leaf::new("a").with_photo("photos/a.jpg");
    let mut copy = original.clone();
    assert!(!original.is_need_update(&copy));

    copy.title = "b".to_string();
    assert_eq!(original.title, "a");
    assert!(original.is_need_update(&copy));
}

#[tokio::test]
async fn test_add_and_update() {
    let ctx = context("alice");
    let leaf = Leaf::new("draft");
    leaf.add(&ctx).await.unwrap();

    assert!(!leaf.update(&ctx, &leaf.clone()).await.unwrap());

    let mut edited = leaf.clone();
    edited.title = "final".to_string();
    assert!(leaf.update(&ctx, &edited).await.unwrap());

    let table = ctx.table::<Leaf>().await.unwrap();
    assert_eq!(table.get(leaf.id()).await.unwrap().unwrap().title, "final");
}

#[tokio::test]
async fn test_remove_deletes_row_and_assets() {
    let assets = Arc::new(MemoryAssetStore::new());
    let ctx = context("alice").with_assets(assets.clone());

    assets.insert("photos/1.jpg");
    assets.insert("photos/other.jpg");
    let leaf = Leaf::new("with photo").with_photo("photos/1.jpg");
    leaf.add(&ctx).await.unwrap();

    let table = ctx.table::<Leaf>().await.unwrap();
    assert!(table.get(leaf.id()).await.unwrap().is_some());

    leaf.remove(&ctx).await.unwrap();
    assert!(table.get(leaf.id()).await.unwrap().is_none());
    assert_eq!(assets.len(), 1);
}

#[tokio::test]
async fn test_missing_asset_reads_as_absent() {
    let assets = Arc::new(MemoryAssetStore::new());
    let ctx = context("alice").with_assets(assets.clone());

    assets.insert("photos/1.jpg");
    let leaf = Leaf::new("a").with_photo("photos/1.jpg");
    leaf.add(&ctx).await.unwrap();

    assets.delete("photos/1.jpg").await.unwrap();

    let table = ctx.table::<Leaf>().await.unwrap();
    assert!(table.get(leaf.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_without_asset_store_reports_error() {
    let ctx = context("alice");
    let leaf = Leaf::new("a").with_photo("photos/1.jpg");
    leaf.add(&ctx).await.unwrap();

    let err = leaf.remove(&ctx).await.unwrap_err();
    assert!(matches!(err, TableError::Asset(_)));

    // The row is removed before assets are touched.
    let table = ctx.table::<Leaf>().await.unwrap();
    assert!(table.get(leaf.id()).await.unwrap().is_none());
}
