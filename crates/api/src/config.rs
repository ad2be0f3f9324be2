//! Environment-driven service configuration.

use std::net::SocketAddr;
use std::str::FromStr;

use aegis_auth::{DEFAULT_CONTEXT_MAX_CHARS, DEFAULT_TENANT_HEADER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AegisConfig {
    pub bind_addr: SocketAddr,
    pub tenant_header: String,
    pub audit_workers: usize,
    pub audit_queue_capacity: usize,
    pub audit_context_max_chars: usize,
    /// Let administrators past the tenant guard without an employee link.
    pub admin_bypasses_tenant_guard: bool,
    /// HS256 secret; bearer tokens are JWTs when set, static dev tokens otherwise.
    pub jwt_secret: Option<String>,
}

impl Default for AegisConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            tenant_header: DEFAULT_TENANT_HEADER.to_string(),
            audit_workers: 2,
            audit_queue_capacity: 500,
            audit_context_max_chars: DEFAULT_CONTEXT_MAX_CHARS,
            admin_bypasses_tenant_guard: false,
            jwt_secret: None,
        }
    }
}

impl AegisConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values keep their
    /// defaults and are logged.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: parsed(&lookup, "AEGIS_BIND_ADDR", defaults.bind_addr),
            tenant_header: lookup("AEGIS_TENANT_HEADER")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.tenant_header),
            audit_workers: parsed(&lookup, "AEGIS_AUDIT_WORKERS", defaults.audit_workers).max(1),
            audit_queue_capacity: parsed(
                &lookup,
                "AEGIS_AUDIT_QUEUE_CAPACITY",
                defaults.audit_queue_capacity,
            ),
            audit_context_max_chars: parsed(
                &lookup,
                "AEGIS_AUDIT_CONTEXT_MAX_CHARS",
                defaults.audit_context_max_chars,
            ),
            admin_bypasses_tenant_guard: parsed(
                &lookup,
                "AEGIS_ADMIN_BYPASSES_TENANT_GUARD",
                defaults.admin_bypasses_tenant_guard,
            ),
            jwt_secret: lookup("AEGIS_JWT_SECRET").filter(|v| !v.is_empty()),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "invalid configuration value; using default");
            default
        }
    }
}
