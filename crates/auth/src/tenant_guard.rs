//! Tenant membership gate, applied before any business logic runs.

use std::sync::Arc;

use thiserror::Error;

use aegis_core::{TenantContext, TenantId};

use crate::{AuthorizationEvaluator, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantAccessError {
    #[error("authentication required for tenant {0}")]
    Unauthenticated(TenantId),

    #[error("user '{username}' has no employee record")]
    NoEmployeeLink { username: String },

    #[error("user '{username}' has no access to tenant {tenant}")]
    NotAMember { username: String, tenant: TenantId },
}

/// Rejects requests whose selected tenant is outside the principal's
/// memberships. Requests without a selected tenant pass through.
#[derive(Debug, Clone, Default)]
pub struct TenantAccessGuard {
    admin_bypass: Option<Arc<AuthorizationEvaluator>>,
}

impl TenantAccessGuard {
    /// Guard with no administrator bypass: administrators need an employee
    /// link like everyone else.
    pub fn new() -> Self {
        Self::default()
    }

    /// Let administrators through without an employee link.
    pub fn with_admin_bypass(evaluator: Arc<AuthorizationEvaluator>) -> Self {
        Self {
            admin_bypass: Some(evaluator),
        }
    }

    pub fn admin_bypass_enabled(&self) -> bool {
        self.admin_bypass.is_some()
    }

    pub fn check(
        &self,
        requested: Option<TenantId>,
        principal: Option<&Principal>,
    ) -> Result<(), TenantAccessError> {
        let Some(tenant) = requested else {
            return Ok(());
        };

        let Some(principal) = principal.filter(|p| p.authenticated) else {
            tracing::warn!(tenant_id = %tenant, "tenant selected without authentication");
            return Err(TenantAccessError::Unauthenticated(tenant));
        };

        if let Some(evaluator) = &self.admin_bypass {
            if evaluator.is_administrator(principal) {
                tracing::debug!(username = %principal.username, tenant_id = %tenant, "tenant guard admin bypass");
                return Ok(());
            }
        }

        let Some(employee) = principal.employee.as_ref() else {
            tracing::warn!(username = %principal.username, tenant_id = %tenant, "access denied: no employee record");
            return Err(TenantAccessError::NoEmployeeLink {
                username: principal.username.clone(),
            });
        };

        if !employee.contains(tenant) {
            tracing::warn!(username = %principal.username, tenant_id = %tenant, "access denied: not a member of tenant");
            return Err(TenantAccessError::NotAMember {
                username: principal.username.clone(),
                tenant,
            });
        }

        Ok(())
    }

    /// [`Self::check`] against the tenant bound to the current thread.
    pub fn check_current(&self, principal: Option<&Principal>) -> Result<(), TenantAccessError> {
        self.check(TenantContext::get(), principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, AuditLogEntry, AuditSink};
    use crate::registry::RbacRegistry;
    use crate::{RequestTenantResolver, TenantMembership};
    use aegis_core::EmployeeId;
    use aegis_observability::PrometheusMetrics;
    use std::thread;

    struct NullAudit;

    impl AuditSink for NullAudit {
        fn record(&self, _entry: AuditLogEntry) -> Result<(), AuditError> {
            Ok(())
        }
    }

    fn member(tenants: &[i64]) -> Principal {
        Principal::authenticated("ana").with_employee(TenantMembership::new(
            EmployeeId::new(1),
            tenants.iter().copied().map(TenantId::new),
        ))
    }

    #[test]
    fn no_tenant_passes_through() {
        let guard = TenantAccessGuard::new();
        assert_eq!(guard.check(None, None), Ok(()));
    }

    #[test]
    fn members_pass_and_non_members_are_rejected() {
        let guard = TenantAccessGuard::new();
        let principal = member(&[5, 6]);

        assert_eq!(guard.check(Some(TenantId::new(5)), Some(&principal)), Ok(()));
        assert_eq!(
            guard.check(Some(TenantId::new(7)), Some(&principal)),
            Err(TenantAccessError::NotAMember {
                username: "ana".into(),
                tenant: TenantId::new(7),
            })
        );
    }

    #[test]
    fn tenant_without_principal_is_rejected() {
        let guard = TenantAccessGuard::new();
        assert_eq!(
            guard.check(Some(TenantId::new(5)), None),
            Err(TenantAccessError::Unauthenticated(TenantId::new(5)))
        );
    }

    #[test]
    fn principal_without_employee_is_rejected_even_as_admin() {
        let registry = Arc::new(RbacRegistry::new());
        let (admin, _) = registry.seed_defaults().unwrap();
        let principal = Principal::authenticated("root").with_roles([admin]);

        let guard = TenantAccessGuard::new();
        let err = thread::spawn(move || {
            TenantContext::set(TenantId::new(5));
            let result = guard.check_current(Some(&principal));
            TenantContext::clear();
            result
        })
        .join()
        .unwrap();

        assert_eq!(err, Err(TenantAccessError::NoEmployeeLink { username: "root".into() }));
    }

    #[test]
    fn admin_bypass_is_opt_in() {
        let registry = Arc::new(RbacRegistry::new());
        let (admin, _) = registry.seed_defaults().unwrap();
        let evaluator = Arc::new(AuthorizationEvaluator::new(
            registry,
            Arc::new(NullAudit),
            Arc::new(PrometheusMetrics::new()),
        ));
        let principal = Principal::authenticated("root").with_roles([admin]);

        let guard = TenantAccessGuard::with_admin_bypass(evaluator);
        assert!(guard.admin_bypass_enabled());
        assert_eq!(guard.check(Some(TenantId::new(5)), Some(&principal)), Ok(()));
    }

    #[test]
    fn malformed_header_leaves_guard_as_noop() {
        let resolver = RequestTenantResolver::default();
        let guard = TenantAccessGuard::new();
        let principal = Principal::authenticated("ana");

        let result = thread::spawn(move || resolver.run(Some("abc"), || guard.check_current(Some(&principal))))
            .join()
            .unwrap();

        assert_eq!(result, Ok(()));
    }
}
