use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use aegis_core::{EmployeeId, GroupId, RoleId, TenantId};

/// A principal's employee record and the tenants it may act within.
///
/// This is the authority for both the tenant access guard and context-key
/// matching in the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub employee_id: EmployeeId,
    pub tenants: BTreeSet<TenantId>,
}

impl TenantMembership {
    pub fn new(employee_id: EmployeeId, tenants: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            employee_id,
            tenants: tenants.into_iter().collect(),
        }
    }

    pub fn contains(&self, tenant_id: TenantId) -> bool {
        self.tenants.contains(&tenant_id)
    }
}

/// An authenticated actor as produced by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub authenticated: bool,
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
    #[serde(default)]
    pub groups: BTreeSet<GroupId>,
    #[serde(default)]
    pub employee: Option<TenantMembership>,
    /// Deprecated single-role string from before role sets existed.
    ///
    /// Only consulted when `roles` is empty; remove once every principal
    /// carries a role set.
    #[serde(default)]
    pub legacy_role: Option<String>,
}

impl Principal {
    /// An authenticated principal with no roles, groups or employee link.
    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authenticated: true,
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
            employee: None,
            legacy_role: None,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn with_employee(mut self, membership: TenantMembership) -> Self {
        self.employee = Some(membership);
        self
    }

    pub fn with_legacy_role(mut self, role: impl Into<String>) -> Self {
        self.legacy_role = Some(role.into());
        self
    }

    /// Tenants this principal may act within (empty without an employee link).
    pub fn tenant_ids(&self) -> BTreeSet<TenantId> {
        self.employee
            .as_ref()
            .map(|e| e.tenants.clone())
            .unwrap_or_default()
    }
}
