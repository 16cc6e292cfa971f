//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Document store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store. Contents are lost when the process exits.
    Memory,
    /// One JSON document per physical table under a root directory.
    Filesystem {
        /// Root directory for table files.
        path: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/tables"),
        }
    }
}

impl StoreConfig {
    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    Err("filesystem store requires a non-empty 'path'".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Retry policy applied by the store access wrapper to transient failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one. 1 disables retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds. Doubles per attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the delay between attempts in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `attempt` (0-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }

    /// Validate retry configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }
}

/// Paging defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Page size used by callers that do not choose one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Rows fetched per store round-trip while collecting rows to migrate.
    #[serde(default = "default_migration_page_size")]
    pub migration_page_size: usize,
}

fn default_page_size() -> usize {
    25
}

fn default_migration_page_size() -> usize {
    100
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            migration_page_size: default_migration_page_size(),
        }
    }
}

impl PagingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_page_size == 0 {
            return Err("paging.default_page_size must be at least 1".to_string());
        }
        if self.migration_page_size == 0 {
            return Err("paging.migration_page_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Initial identity used when no identity has been established yet.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Tenant id to start with. A random anonymous id is generated when unset.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// External auth providers already linked to the tenant.
    #[serde(default)]
    pub linked_providers: Vec<String>,
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Namespace prefixed to every logical table name (`"{app_name}.{table}"`).
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Document store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Retry policy for transient store failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Paging defaults.
    #[serde(default)]
    pub paging: PagingConfig,
    /// Initial identity.
    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_app_name() -> String {
    crate::DEFAULT_APP_NAME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            store: StoreConfig::default(),
            retry: RetryConfig::default(),
            paging: PagingConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses the in-memory store and disables retries.
    pub fn for_testing() -> Self {
        Self {
            app_name: "test".to_string(),
            store: StoreConfig::Memory,
            retry: RetryConfig::disabled(),
            paging: PagingConfig::default(),
            identity: IdentityConfig::default(),
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> crate::Result<()> {
        if self.app_name.is_empty() {
            return Err(crate::Error::Config("app_name must not be empty".to_string()));
        }
        if self.app_name.contains('/') || self.app_name.contains("..") {
            return Err(crate::Error::Config(format!(
                "app_name contains unsafe characters: {}",
                self.app_name
            )));
        }
        self.store.validate().map_err(crate::Error::Config)?;
        self.retry.validate().map_err(crate::Error::Config)?;
        self.paging.validate().map_err(crate::Error::Config)?;
        if let Some(tenant_id) = &self.identity.tenant_id
            && tenant_id.is_empty()
        {
            return Err(crate::Error::Config(
                "identity.tenant_id must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}
