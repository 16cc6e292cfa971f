//! Multi-tenant typed tables for Satchel.
//!
//! This crate layers records over a document store:
//! - Tenant-scoped CRUD, query and scan (`Table`)
//! - Cursors and single-flight pagers
//! - Identity rotation with per-table row migration
//! - Record codecs and asset checks
//! - An explicit `Context` sharing one table per physical name

pub mod assets;
pub mod codec;
pub mod context;
pub mod cursor;
pub mod error;
pub mod identity;
pub mod migration;
pub mod pager;
pub mod record;
pub mod table;

pub use assets::{AssetStore, MemoryAssetStore};
pub use codec::{AssetCheckedCodec, CONTENT_COLUMN, ContentCodec, Row, RowCodec};
pub use context::Context;
pub use cursor::Cursor;
pub use error::{TableError, TableResult};
pub use identity::{HookRegistration, Identity, IdentityProvider, RotationHook};
pub use migration::{MigrationHook, MigrationStats};
pub use pager::{PageSource, Pager, QuerySource, ScanSource};
pub use record::{Record, RecordExt};
pub use table::{PhysicalTable, QueryOptions, Table, TableSpec};
