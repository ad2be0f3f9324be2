//! Audit trail model for authorization decisions.
//!
//! The persisted shape (`timestamp, username, resource, action, context,
//! outcome, details`) is consumed by downstream security tooling; keep field
//! names stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default cap applied to context values before they are stored.
pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOutcome {
    Allow,
    Deny,
}

impl AuditOutcome {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        }
    }
}

impl core::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One authorization decision. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub context: Option<String>,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

impl AuditLogEntry {
    /// Build an entry stamped now, truncating `context` to `context_max_chars`.
    pub fn new(
        username: impl Into<String>,
        resource: &str,
        action: &str,
        context: Option<String>,
        allowed: bool,
        details: Option<String>,
        context_max_chars: usize,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            username: username.into(),
            resource: non_empty(resource),
            action: non_empty(action),
            context: context.map(|c| truncate_chars(&c, context_max_chars)),
            outcome: AuditOutcome::from_allowed(allowed),
            details,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit store failure: {0}")]
    Store(String),

    #[error("audit dispatcher is shut down")]
    Closed,
}

/// Destination for decision records.
///
/// Implementations may persist synchronously or hand off to a background
/// worker; the evaluator logs and swallows any error.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditLogEntry) -> Result<(), AuditError>;
}

impl<T: AuditSink + ?Sized> AuditSink for std::sync::Arc<T> {
    fn record(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        (**self).record(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_truncated_on_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[test]
    fn entry_caps_context_and_mirrors_outcome() {
        let long = "9".repeat(500);
        let entry = AuditLogEntry::new("ana", "ATIVO", "READ", Some(long), false, None, 128);
        assert_eq!(entry.context.as_deref().map(str::len), Some(128));
        assert_eq!(entry.outcome, AuditOutcome::Deny);
    }

    #[test]
    fn persisted_shape_is_stable() {
        let entry = AuditLogEntry::new("ana", "ATIVO", "READ", Some("5".into()), true, None, 128);
        let json = serde_json::to_value(&entry).unwrap();
        for field in ["timestamp", "username", "resource", "action", "context", "outcome", "details"] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["outcome"], "ALLOW");
    }
}
