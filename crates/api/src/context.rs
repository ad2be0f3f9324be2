use aegis_auth::Principal;
use aegis_core::TenantId;

/// Tenant selected by the request's tenant header, after the access guard
/// has approved it. `None` when the request is not tenant-scoped.
///
/// Async handlers read the tenant from here rather than from the
/// thread-bound `TenantContext`, since a task may hop threads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestTenant {
    tenant_id: Option<TenantId>,
}

impl RequestTenant {
    pub fn new(tenant_id: Option<TenantId>) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

/// Authenticated principal for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn username(&self) -> &str {
        &self.principal.username
    }
}
