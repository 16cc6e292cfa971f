//! Core domain types and shared configuration for Satchel.
//!
//! This crate defines the pieces shared by every other crate:
//! - Tenant and item identifiers
//! - Application, store, retry, paging and identity configuration

pub mod config;
pub mod error;
pub mod ids;

pub use config::{AppConfig, IdentityConfig, PagingConfig, RetryConfig, StoreConfig};
pub use error::{Error, Result};
pub use ids::{ItemId, TenantId};

/// Default namespace prefixed to every physical table name.
pub const DEFAULT_APP_NAME: &str = "satchel";
