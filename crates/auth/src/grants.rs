//! Effective grants and their cache.
//!
//! Resolving a principal's role/group assignments into permissions is the
//! only lookup on the decision path, so results are cached. Every cached
//! entry is stamped with the source's generation; any administrative edit
//! bumps the generation and makes all older entries unreadable, so a stale
//! grant is never served.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use aegis_core::{GroupId, RoleId};

use crate::Permission;

/// What a set of role/group assignments resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveGrants {
    /// Names of the assigned roles (the principal's authorities).
    pub role_names: BTreeSet<String>,
    /// Union of role and group permissions, deduplicated by id.
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("permission source unavailable: {0}")]
    Unavailable(String),
}

/// Store of roles, groups and permissions consulted by the evaluator.
pub trait PermissionSource: Send + Sync {
    /// Counter bumped by every edit that can change a resolution result.
    fn generation(&self) -> u64;

    fn resolve(
        &self,
        roles: &BTreeSet<RoleId>,
        groups: &BTreeSet<GroupId>,
    ) -> Result<EffectiveGrants, SourceError>;
}

impl<T: PermissionSource + ?Sized> PermissionSource for Arc<T> {
    fn generation(&self) -> u64 {
        (**self).generation()
    }

    fn resolve(
        &self,
        roles: &BTreeSet<RoleId>,
        groups: &BTreeSet<GroupId>,
    ) -> Result<EffectiveGrants, SourceError> {
        (**self).resolve(roles, groups)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GrantKey {
    roles: Vec<RoleId>,
    groups: Vec<GroupId>,
}

#[derive(Debug, Clone)]
struct CachedGrants {
    generation: u64,
    grants: Arc<EffectiveGrants>,
}

/// Cache keyed by the assignment set itself, so reassigning a principal's
/// roles or groups can never hit an entry computed for the old assignment.
#[derive(Debug)]
pub struct GrantCache {
    capacity: usize,
    inner: RwLock<HashMap<GrantKey, CachedGrants>>,
}

impl GrantCache {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_resolve(
        &self,
        source: &dyn PermissionSource,
        roles: &BTreeSet<RoleId>,
        groups: &BTreeSet<GroupId>,
    ) -> Result<Arc<EffectiveGrants>, SourceError> {
        // Read the generation before resolving: an edit racing with the
        // resolution leaves an entry stamped with the older generation.
        let generation = source.generation();
        let key = GrantKey {
            roles: roles.iter().copied().collect(),
            groups: groups.iter().copied().collect(),
        };

        if let Ok(map) = self.inner.read() {
            if let Some(cached) = map.get(&key) {
                if cached.generation == generation {
                    return Ok(cached.grants.clone());
                }
            }
        }

        let grants = Arc::new(source.resolve(roles, groups)?);

        if let Ok(mut map) = self.inner.write() {
            if map.len() >= self.capacity {
                map.clear();
            }
            map.insert(
                key,
                CachedGrants {
                    generation,
                    grants: grants.clone(),
                },
            );
        }

        Ok(grants)
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GrantCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
