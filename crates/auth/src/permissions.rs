use serde::{Deserialize, Serialize};

use aegis_core::PermissionId;

/// A grant of one `action` on one `resource`, optionally scoped.
///
/// Identity is `(resource, action)`, compared ASCII case-insensitively.
/// When `context_key` is set (e.g. `"tenantId"`), the grant only applies if
/// the call site supplies a context value inside the principal's tenant
/// membership set.
///
/// Permissions are immutable once created: changing a grant means creating
/// a new permission and reassigning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub resource: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(id: PermissionId, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id,
            resource: resource.into(),
            action: action.into(),
            context_key: None,
            description: String::new(),
        }
    }

    pub fn scoped_by(mut self, context_key: impl Into<String>) -> Self {
        self.context_key = Some(context_key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether this permission is about `resource`/`action`.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.resource.eq_ignore_ascii_case(resource) && self.action.eq_ignore_ascii_case(action)
    }

    /// The scoping attribute, treating an empty key as unscoped.
    pub fn context_key(&self) -> Option<&str> {
        self.context_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.context_key() {
            Some(key) => write!(f, "{}:{}[{}]", self.resource, self.action, key),
            None => write!(f, "{}:{}", self.resource, self.action),
        }
    }
}
