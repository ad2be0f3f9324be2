//! Call-site context values checked against tenant membership.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use aegis_core::TenantId;

/// The scoping value a call site passes along with a permission check.
///
/// `Raw` carries text that has not been interpreted yet (a bound argument,
/// a query parameter); it is parsed as a tenant id at match time and never
/// matches when malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    #[default]
    Absent,
    Tenant(TenantId),
    Tenants(Vec<TenantId>),
    Raw(String),
}

impl ContextValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Whether the value lies inside `allowed`.
    ///
    /// Collections require every element to be a member, so an empty
    /// collection is vacuously inside (an employee linked to no branches
    /// asking about all of its branches).
    pub fn within(&self, allowed: &BTreeSet<TenantId>) -> bool {
        match self {
            Self::Absent => false,
            Self::Tenant(id) => allowed.contains(id),
            Self::Tenants(ids) => ids.iter().all(|id| allowed.contains(id)),
            Self::Raw(text) => match text.parse::<TenantId>() {
                Ok(id) => allowed.contains(&id),
                Err(_) => {
                    tracing::warn!(context = %text, "invalid context id format");
                    false
                }
            },
        }
    }

    /// String form stored in the audit trail (`None` when absent).
    pub fn audit_repr(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            other => Some(other.to_string()),
        }
    }
}

impl core::fmt::Display for ContextValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Absent => Ok(()),
            Self::Tenant(id) => write!(f, "{id}"),
            Self::Tenants(ids) => {
                f.write_str("[")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{id}")?;
                }
                f.write_str("]")
            }
            Self::Raw(text) => f.write_str(text),
        }
    }
}

impl From<TenantId> for ContextValue {
    fn from(value: TenantId) -> Self {
        Self::Tenant(value)
    }
}

impl From<Option<TenantId>> for ContextValue {
    fn from(value: Option<TenantId>) -> Self {
        value.map_or(Self::Absent, Self::Tenant)
    }
}

impl From<Vec<TenantId>> for ContextValue {
    fn from(value: Vec<TenantId>) -> Self {
        Self::Tenants(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Raw(value.to_string())
    }
}
