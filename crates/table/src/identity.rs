//! Tenant identity and rotation notification.
//!
//! The [`IdentityProvider`] owns the process-wide current [`Identity`]. When
//! the tenant id rotates, every registered [`RotationHook`] is invoked with
//! the old and new ids, concurrently, and only once all of them have finished
//! is the new identity made visible to callers of [`IdentityProvider::current`].

use crate::migration::MigrationStats;
use async_trait::async_trait;
use futures::future::join_all;
use satchel_core::config::IdentityConfig;
use satchel_core::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use time::OffsetDateTime;

/// The tenant's current id and the external auth providers linked to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: TenantId,
    pub linked_providers: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl Identity {
    pub fn new(id: TenantId, linked_providers: impl IntoIterator<Item = String>) -> Self {
        Self {
            id,
            linked_providers: linked_providers.into_iter().collect(),
            issued_at: OffsetDateTime::now_utc(),
        }
    }

    /// A fresh identity with a random id and no linked providers.
    pub fn anonymous() -> Self {
        Self::new(TenantId::random(), Vec::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.linked_providers.is_empty()
    }

    pub fn is_linked(&self, provider: &str) -> bool {
        self.linked_providers.contains(provider)
    }
}

/// Callback invoked when the tenant id rotates.
#[async_trait]
pub trait RotationHook: Send + Sync {
    /// Relocate whatever the hook owns from `old` to `new`.
    async fn on_rotate(&self, old: &TenantId, new: &TenantId) -> MigrationStats;
}

#[derive(Default)]
struct HookRegistry {
    next_id: AtomicU64,
    hooks: Mutex<Vec<(u64, Arc<dyn RotationHook>)>>,
}

impl HookRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<dyn RotationHook>)>> {
        self.hooks.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Hook registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn snapshot(&self) -> Vec<Arc<dyn RotationHook>> {
        self.lock().iter().map(|(_, hook)| hook.clone()).collect()
    }
}

/// Handle to a registered hook. Dropping it deregisters the hook.
#[must_use = "dropping the registration immediately deregisters the hook"]
pub struct HookRegistration {
    id: u64,
    registry: Weak<HookRegistry>,
}

impl HookRegistration {
    /// Keep the hook registered for the lifetime of the provider.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Supplies the current identity and runs rotation hooks.
pub struct IdentityProvider {
    current: RwLock<Arc<Identity>>,
    hooks: Arc<HookRegistry>,
    rotation: tokio::sync::Mutex<()>,
}

impl IdentityProvider {
    pub fn new(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Arc::new(identity)),
            hooks: Arc::new(HookRegistry::default()),
            rotation: tokio::sync::Mutex::new(()),
        }
    }

    /// Build the initial identity from configuration, anonymous if no tenant
    /// id is configured.
    pub fn from_config(config: &IdentityConfig) -> satchel_core::Result<Self> {
        let identity = match &config.tenant_id {
            Some(id) => Identity::new(
                TenantId::parse(id)?,
                config.linked_providers.iter().cloned(),
            ),
            None => Identity::anonymous(),
        };
        Ok(Self::new(identity))
    }

    /// Snapshot of the current identity. During a rotation this is the old
    /// identity until every hook has completed.
    pub fn current(&self) -> Arc<Identity> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| {
                tracing::warn!("Identity lock was poisoned, recovering");
                poisoned.into_inner()
            })
            .clone()
    }

    pub fn tenant_id(&self) -> TenantId {
        self.current().id.clone()
    }

    /// Register a hook to run on every rotation.
    pub fn on_rotate(&self, hook: Arc<dyn RotationHook>) -> HookRegistration {
        let id = self.hooks.next_id.fetch_add(1, Ordering::Relaxed);
        self.hooks.lock().push((id, hook));
        HookRegistration {
            id,
            registry: Arc::downgrade(&self.hooks),
        }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Rotate to `new_id`, keeping the linked providers.
    pub async fn rotate(&self, new_id: TenantId) -> Vec<MigrationStats> {
        let _guard = self.rotation.lock().await;
        let current = self.current();
        let next = Identity::new(new_id, current.linked_providers.iter().cloned());
        self.transition(&current, next).await
    }

    /// Link an external auth provider. The federation may hand out a new
    /// tenant id on linking, in which case the identity rotates.
    pub async fn link_provider(
        &self,
        provider: impl Into<String>,
        new_id: TenantId,
    ) -> Vec<MigrationStats> {
        let _guard = self.rotation.lock().await;
        let current = self.current();
        let mut next = Identity::new(new_id, current.linked_providers.iter().cloned());
        next.linked_providers.insert(provider.into());
        self.transition(&current, next).await
    }

    /// Must be called with the rotation lock held.
    async fn transition(&self, current: &Identity, next: Identity) -> Vec<MigrationStats> {
        let stats = if current.id == next.id {
            Vec::new()
        } else {
            let hooks = self.hooks.snapshot();
            tracing::info!(
                old = %current.id,
                new = %next.id,
                hooks = hooks.len(),
                "Rotating tenant identity"
            );
            join_all(hooks.iter().map(|hook| hook.on_rotate(&current.id, &next.id))).await
        };

        *self.current.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Identity lock was poisoned, recovering");
            poisoned.into_inner()
        }) = Arc::new(next);
        stats
    }
}
