//! Threshold configuration storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stockpilot_core::TenantId;

use crate::config::{ThresholdConfig, ThresholdPatch};

/// Tenant-scoped store for threshold configs.
///
/// `get_or_init` creates the documented defaults lazily on first use, so a
/// tenant that never configured anything still gets a working policy.
pub trait ThresholdStore: Send + Sync {
    fn get(&self, tenant_id: TenantId) -> Option<ThresholdConfig>;

    /// Get the tenant's config, persisting the defaults first if absent.
    fn get_or_init(&self, tenant_id: TenantId) -> ThresholdConfig;

    /// Apply a partial update, creating the defaults first if absent.
    /// Returns the resulting config.
    fn upsert(&self, tenant_id: TenantId, patch: ThresholdPatch) -> ThresholdConfig;
}

impl<S> ThresholdStore for Arc<S>
where
    S: ThresholdStore + ?Sized,
{
    fn get(&self, tenant_id: TenantId) -> Option<ThresholdConfig> {
        (**self).get(tenant_id)
    }

    fn get_or_init(&self, tenant_id: TenantId) -> ThresholdConfig {
        (**self).get_or_init(tenant_id)
    }

    fn upsert(&self, tenant_id: TenantId, patch: ThresholdPatch) -> ThresholdConfig {
        (**self).upsert(tenant_id, patch)
    }
}

/// In-memory threshold store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryThresholdStore {
    inner: RwLock<HashMap<TenantId, ThresholdConfig>>,
}

impl InMemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ThresholdStore for InMemoryThresholdStore {
    fn get(&self, tenant_id: TenantId) -> Option<ThresholdConfig> {
        self.inner.read().ok()?.get(&tenant_id).cloned()
    }

    fn get_or_init(&self, tenant_id: TenantId) -> ThresholdConfig {
        let mut map = match self.inner.write() {
            Ok(m) => m,
            Err(_) => return ThresholdConfig::default(),
        };
        map.entry(tenant_id).or_default().clone()
    }

    fn upsert(&self, tenant_id: TenantId, patch: ThresholdPatch) -> ThresholdConfig {
        let mut map = match self.inner.write() {
            Ok(m) => m,
            Err(_) => return ThresholdConfig::default().apply(patch),
        };
        let current = map.entry(tenant_id).or_default().clone();
        let updated = current.apply(patch);
        map.insert(tenant_id, updated.clone());
        updated
    }
}
