//! Binds an inbound request to the tenant named by its selector header.

use aegis_core::{TenantContext, TenantId};

pub const DEFAULT_TENANT_HEADER: &str = "X-Filial-ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTenantResolver {
    header_name: String,
}

impl Default for RequestTenantResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_HEADER)
    }
}

impl RequestTenantResolver {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Parse the raw header value. Absent, blank and malformed values yield
    /// `None`; malformed ones are logged.
    ///
    /// The value is parsed as-is: surrounding whitespace makes it malformed.
    pub fn resolve(&self, header_value: Option<&str>) -> Option<TenantId> {
        let raw = header_value.filter(|v| !v.trim().is_empty())?;
        match raw.parse::<i64>() {
            Ok(id) => {
                tracing::debug!(tenant = id, "tenant context bound");
                Some(TenantId::new(id))
            }
            Err(err) => {
                tracing::warn!(
                    header = %self.header_name,
                    value = raw,
                    error = %err,
                    "invalid tenant header; proceeding without tenant context"
                );
                None
            }
        }
    }

    /// Run `downstream` with the resolved tenant bound to this thread.
    ///
    /// The binding is cleared when `downstream` returns or unwinds.
    pub fn run<T>(&self, header_value: Option<&str>, downstream: impl FnOnce() -> T) -> T {
        let _scope = TenantContext::enter(self.resolve(header_value));
        downstream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;
    use std::thread;

    #[test]
    fn well_formed_header_is_bound() {
        let resolver = RequestTenantResolver::default();
        thread::spawn(move || {
            let seen = resolver.run(Some("5"), TenantContext::get);
            assert_eq!(seen, Some(TenantId::new(5)));
            assert_eq!(TenantContext::get(), None);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn malformed_header_proceeds_unscoped() {
        let resolver = RequestTenantResolver::default();
        thread::spawn(move || {
            let mut ran = false;
            let seen = resolver.run(Some("abc"), || {
                ran = true;
                TenantContext::get()
            });
            assert!(ran);
            assert_eq!(seen, None);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn padded_header_is_malformed() {
        let resolver = RequestTenantResolver::default();
        assert_eq!(resolver.resolve(Some(" 5 ")), None);
        assert_eq!(resolver.resolve(Some("5\t")), None);
        assert_eq!(resolver.resolve(Some("-3")), Some(TenantId::new(-3)));
    }

    #[test]
    fn blank_or_absent_header_sets_nothing() {
        let resolver = RequestTenantResolver::default();
        assert_eq!(resolver.resolve(None), None);
        assert_eq!(resolver.resolve(Some("   ")), None);
    }

    #[test]
    fn context_is_cleared_when_downstream_panics() {
        let resolver = RequestTenantResolver::new("X-Tenant");
        thread::spawn(move || {
            let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                resolver.run(Some("9"), || panic!("handler failed"))
            }));
            assert!(result.is_err());
            assert_eq!(TenantContext::get(), None);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn stale_binding_from_previous_request_is_cleared() {
        let resolver = RequestTenantResolver::default();
        thread::spawn(move || {
            TenantContext::set(TenantId::new(5));
            let seen = resolver.run(None, TenantContext::get);
            assert_eq!(seen, None);
        })
        .join()
        .unwrap();
    }
}
