use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use aegis_core::{GroupId, PermissionId, RoleId};

/// Sentinel authority that bypasses every permission and context check.
pub const ADMIN_ROLE: &str = "ROLE_ADMIN";

/// Authority recognized by the read-only fallback for principals without
/// role-derived permissions.
pub const BASIC_USER_ROLE: &str = "ROLE_USER";

/// The action the basic-user fallback grants.
pub const READ_ACTION: &str = "READ";

/// Named collection of permissions assigned to principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<PermissionId>,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Named collection of permissions, assigned independently of roles.
///
/// Groups contribute permissions only; they never carry authorities, so a
/// group cannot confer the administrator bypass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<PermissionId>,
}
