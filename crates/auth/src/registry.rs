//! RBAC administration: the in-process store of roles, groups and permissions.
//!
//! Every mutating operation bumps the registry generation, which invalidates
//! all cached grant resolutions (see [`crate::grants`]).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use thiserror::Error;

use aegis_core::{DomainError, GroupId, PermissionId, RoleId};

use crate::grants::{EffectiveGrants, PermissionSource, SourceError};
use crate::{ADMIN_ROLE, BASIC_USER_ROLE, Group, Permission, Role};

const MAX_RESOURCE_LEN: usize = 64;
const MAX_ACTION_LEN: usize = 32;
const MAX_CONTEXT_KEY_LEN: usize = 32;
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RbacError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("a {kind} named '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("unknown permission ids: {0:?}")]
    UnknownPermissions(Vec<PermissionId>),

    #[error("permission {id} is still referenced by roles {roles:?} and groups {groups:?}")]
    PermissionInUse {
        id: PermissionId,
        roles: Vec<String>,
        groups: Vec<String>,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rbac registry lock poisoned")]
    Poisoned,
}

impl From<RbacError> for DomainError {
    fn from(value: RbacError) -> Self {
        match value {
            RbacError::NotFound { .. } => DomainError::not_found(value.to_string()),
            RbacError::DuplicateName { .. } | RbacError::PermissionInUse { .. } => {
                DomainError::conflict(value.to_string())
            }
            RbacError::UnknownPermissions(_) | RbacError::Validation(_) => {
                DomainError::validation(value.to_string())
            }
            RbacError::Poisoned => DomainError::conflict(value.to_string()),
        }
    }
}

/// Input for creating a permission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub context_key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for creating or updating a role or group.
///
/// On update, `permission_ids: None` keeps the current permissions while
/// `Some(ids)` replaces them.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantSetDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Option<Vec<PermissionId>>,
}

#[derive(Debug, Default)]
struct RbacState {
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    groups: BTreeMap<GroupId, Group>,
    next_permission_id: i64,
    next_role_id: i64,
    next_group_id: i64,
}

impl RbacState {
    fn checked_permission_ids(
        &self,
        ids: &[PermissionId],
    ) -> Result<BTreeSet<PermissionId>, RbacError> {
        let missing: Vec<PermissionId> = ids
            .iter()
            .filter(|id| !self.permissions.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(RbacError::UnknownPermissions(missing));
        }
        Ok(ids.iter().copied().collect())
    }
}

/// Thread-safe registry of roles, groups and permissions.
#[derive(Debug, Default)]
pub struct RbacRegistry {
    state: RwLock<RbacState>,
    generation: AtomicU64,
}

impl RbacRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the administrator and basic-user roles exist; returns their ids.
    pub fn seed_defaults(&self) -> Result<(RoleId, RoleId), RbacError> {
        let admin = match self.role_by_name(ADMIN_ROLE)? {
            Some(role) => role.id,
            None => {
                self.create_role(GrantSetDraft {
                    name: ADMIN_ROLE.to_string(),
                    description: Some("Full administrator; bypasses permission checks".to_string()),
                    permission_ids: None,
                })?
                .id
            }
        };
        let user = match self.role_by_name(BASIC_USER_ROLE)? {
            Some(role) => role.id,
            None => {
                self.create_role(GrantSetDraft {
                    name: BASIC_USER_ROLE.to_string(),
                    description: Some("Basic user with read-only fallback".to_string()),
                    permission_ids: None,
                })?
                .id
            }
        };
        Ok((admin, user))
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    // ── Permissions ─────────────────────────────────────────────────────────

    pub fn list_permissions(&self) -> Result<Vec<Permission>, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        Ok(state.permissions.values().cloned().collect())
    }

    pub fn get_permission(&self, id: PermissionId) -> Result<Permission, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        state
            .permissions
            .get(&id)
            .cloned()
            .ok_or(RbacError::NotFound { kind: "permission", id: id.get() })
    }

    pub fn create_permission(&self, new: NewPermission) -> Result<Permission, RbacError> {
        let resource = required(&new.resource, "resource", MAX_RESOURCE_LEN)?;
        let action = required(&new.action, "action", MAX_ACTION_LEN)?;
        let context_key = match new.context_key.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(key) if key.len() > MAX_CONTEXT_KEY_LEN => {
                return Err(RbacError::Validation(format!(
                    "context_key longer than {MAX_CONTEXT_KEY_LEN} characters"
                )));
            }
            Some(key) => Some(key.to_string()),
        };

        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if state.permissions.values().any(|p| p.matches(&resource, &action)) {
            return Err(RbacError::DuplicateName {
                kind: "permission",
                name: format!("{resource}:{action}"),
            });
        }

        state.next_permission_id += 1;
        let permission = Permission {
            id: PermissionId::new(state.next_permission_id),
            resource,
            action,
            context_key,
            description: new.description.unwrap_or_default(),
        };
        state.permissions.insert(permission.id, permission.clone());
        self.bump();
        drop(state);

        tracing::info!(permission = %permission, "permission created");
        Ok(permission)
    }

    /// Delete a permission that no role or group references.
    ///
    /// Referenced permissions are rejected with [`RbacError::PermissionInUse`];
    /// detach them from their roles/groups first.
    pub fn delete_permission(&self, id: PermissionId) -> Result<(), RbacError> {
        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if !state.permissions.contains_key(&id) {
            return Err(RbacError::NotFound { kind: "permission", id: id.get() });
        }

        let roles: Vec<String> = state
            .roles
            .values()
            .filter(|r| r.permissions.contains(&id))
            .map(|r| r.name.clone())
            .collect();
        let groups: Vec<String> = state
            .groups
            .values()
            .filter(|g| g.permissions.contains(&id))
            .map(|g| g.name.clone())
            .collect();
        if !roles.is_empty() || !groups.is_empty() {
            return Err(RbacError::PermissionInUse { id, roles, groups });
        }

        state.permissions.remove(&id);
        self.bump();
        drop(state);

        tracing::info!(permission_id = %id, "permission deleted");
        Ok(())
    }

    // ── Roles ───────────────────────────────────────────────────────────────

    pub fn list_roles(&self) -> Result<Vec<Role>, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        Ok(state.roles.values().cloned().collect())
    }

    pub fn get_role(&self, id: RoleId) -> Result<Role, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        state
            .roles
            .get(&id)
            .cloned()
            .ok_or(RbacError::NotFound { kind: "role", id: id.get() })
    }

    pub fn role_by_name(&self, name: &str) -> Result<Option<Role>, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    pub fn create_role(&self, draft: GrantSetDraft) -> Result<Role, RbacError> {
        let name = required(&draft.name, "name", MAX_NAME_LEN)?;

        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if state.roles.values().any(|r| r.name == name) {
            return Err(RbacError::DuplicateName { kind: "role", name });
        }
        let permissions = state.checked_permission_ids(draft.permission_ids.as_deref().unwrap_or(&[]))?;

        state.next_role_id += 1;
        let role = Role {
            id: RoleId::new(state.next_role_id),
            name,
            description: draft.description,
            permissions,
        };
        state.roles.insert(role.id, role.clone());
        self.bump();
        drop(state);

        tracing::info!(role = %role.name, "role created");
        Ok(role)
    }

    pub fn update_role(&self, id: RoleId, draft: GrantSetDraft) -> Result<Role, RbacError> {
        let name = required(&draft.name, "name", MAX_NAME_LEN)?;

        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if !state.roles.contains_key(&id) {
            return Err(RbacError::NotFound { kind: "role", id: id.get() });
        }
        if state.roles.values().any(|r| r.name == name && r.id != id) {
            return Err(RbacError::DuplicateName { kind: "role", name });
        }
        let permissions = match draft.permission_ids.as_deref() {
            Some(ids) => Some(state.checked_permission_ids(ids)?),
            None => None,
        };

        let role = state
            .roles
            .get_mut(&id)
            .ok_or(RbacError::NotFound { kind: "role", id: id.get() })?;
        role.name = name;
        role.description = draft.description;
        if let Some(permissions) = permissions {
            role.permissions = permissions;
        }
        let role = role.clone();
        self.bump();
        drop(state);

        tracing::info!(role = %role.name, "role updated");
        Ok(role)
    }

    pub fn delete_role(&self, id: RoleId) -> Result<(), RbacError> {
        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if state.roles.remove(&id).is_none() {
            return Err(RbacError::NotFound { kind: "role", id: id.get() });
        }
        self.bump();
        drop(state);

        tracing::info!(role_id = %id, "role deleted");
        Ok(())
    }

    // ── Groups ──────────────────────────────────────────────────────────────

    pub fn list_groups(&self) -> Result<Vec<Group>, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        Ok(state.groups.values().cloned().collect())
    }

    pub fn get_group(&self, id: GroupId) -> Result<Group, RbacError> {
        let state = self.state.read().map_err(|_| RbacError::Poisoned)?;
        state
            .groups
            .get(&id)
            .cloned()
            .ok_or(RbacError::NotFound { kind: "group", id: id.get() })
    }

    pub fn create_group(&self, draft: GrantSetDraft) -> Result<Group, RbacError> {
        let name = required(&draft.name, "name", MAX_NAME_LEN)?;

        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if state.groups.values().any(|g| g.name == name) {
            return Err(RbacError::DuplicateName { kind: "group", name });
        }
        let permissions = state.checked_permission_ids(draft.permission_ids.as_deref().unwrap_or(&[]))?;

        state.next_group_id += 1;
        let group = Group {
            id: GroupId::new(state.next_group_id),
            name,
            description: draft.description,
            permissions,
        };
        state.groups.insert(group.id, group.clone());
        self.bump();
        drop(state);

        tracing::info!(group = %group.name, "group created");
        Ok(group)
    }

    pub fn update_group(&self, id: GroupId, draft: GrantSetDraft) -> Result<Group, RbacError> {
        let name = required(&draft.name, "name", MAX_NAME_LEN)?;

        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if !state.groups.contains_key(&id) {
            return Err(RbacError::NotFound { kind: "group", id: id.get() });
        }
        if state.groups.values().any(|g| g.name == name && g.id != id) {
            return Err(RbacError::DuplicateName { kind: "group", name });
        }
        let permissions = match draft.permission_ids.as_deref() {
            Some(ids) => Some(state.checked_permission_ids(ids)?),
            None => None,
        };

        let group = state
            .groups
            .get_mut(&id)
            .ok_or(RbacError::NotFound { kind: "group", id: id.get() })?;
        group.name = name;
        group.description = draft.description;
        if let Some(permissions) = permissions {
            group.permissions = permissions;
        }
        let group = group.clone();
        self.bump();
        drop(state);

        tracing::info!(group = %group.name, "group updated");
        Ok(group)
    }

    pub fn delete_group(&self, id: GroupId) -> Result<(), RbacError> {
        let mut state = self.state.write().map_err(|_| RbacError::Poisoned)?;
        if state.groups.remove(&id).is_none() {
            return Err(RbacError::NotFound { kind: "group", id: id.get() });
        }
        self.bump();
        drop(state);

        tracing::info!(group_id = %id, "group deleted");
        Ok(())
    }
}

impl PermissionSource for RbacRegistry {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn resolve(
        &self,
        roles: &BTreeSet<RoleId>,
        groups: &BTreeSet<GroupId>,
    ) -> Result<EffectiveGrants, SourceError> {
        let state = self
            .state
            .read()
            .map_err(|_| SourceError::Unavailable("rbac registry lock poisoned".to_string()))?;

        let mut role_names = BTreeSet::new();
        let mut permission_ids: BTreeSet<PermissionId> = BTreeSet::new();

        // Unknown ids are skipped: an assignment may outlive a deleted role.
        for role in roles.iter().filter_map(|id| state.roles.get(id)) {
            role_names.insert(role.name.clone());
            permission_ids.extend(role.permissions.iter().copied());
        }
        for group in groups.iter().filter_map(|id| state.groups.get(id)) {
            permission_ids.extend(group.permissions.iter().copied());
        }

        let permissions = permission_ids
            .iter()
            .filter_map(|id| state.permissions.get(id))
            .cloned()
            .collect();

        Ok(EffectiveGrants {
            role_names,
            permissions,
        })
    }
}

fn required(value: &str, field: &str, max_len: usize) -> Result<String, RbacError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RbacError::Validation(format!("{field} must not be blank")));
    }
    if value.len() > max_len {
        return Err(RbacError::Validation(format!(
            "{field} longer than {max_len} characters"
        )));
    }
    Ok(value.to_string())
}
