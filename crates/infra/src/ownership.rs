//! Target-to-tenant ownership lookup (e.g. which branch an asset belongs to).

use std::collections::HashMap;
use std::sync::RwLock;

use aegis_auth::{ContextValue, TargetOwnership};
use aegis_core::TenantId;

/// In-memory ownership table for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTargetOwnership {
    owners: RwLock<HashMap<String, TenantId>>,
}

impl InMemoryTargetOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, target_id: impl Into<String>, tenant_id: TenantId) {
        if let Ok(mut owners) = self.owners.write() {
            owners.insert(target_id.into(), tenant_id);
        }
    }

    pub fn remove(&self, target_id: &str) {
        if let Ok(mut owners) = self.owners.write() {
            owners.remove(target_id);
        }
    }
}

impl TargetOwnership for InMemoryTargetOwnership {
    fn owning_context(&self, target_id: &str) -> Option<ContextValue> {
        self.owners
            .read()
            .ok()?
            .get(target_id.trim())
            .copied()
            .map(ContextValue::Tenant)
    }
}
