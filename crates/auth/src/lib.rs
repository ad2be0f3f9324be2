//! `aegis-auth`: context-scoped RBAC/ABAC authorization core.
//!
//! This crate is decoupled from HTTP and storage: the evaluator consults a
//! [`PermissionSource`], writes to an [`AuditSink`] and meters through a
//! [`aegis_observability::MetricsRecorder`].

pub mod audit;
pub mod authorize;
pub mod bridge;
pub mod claims;
pub mod context_value;
pub mod grants;
pub mod permissions;
pub mod principal;
pub mod registry;
pub mod roles;
pub mod tenant_guard;
pub mod tenant_resolver;

pub use audit::{AuditError, AuditLogEntry, AuditOutcome, AuditSink, DEFAULT_CONTEXT_MAX_CHARS};
pub use authorize::{
    AUTHZ_COUNTER, AUTHZ_TIMER, AuthorizationEvaluator, Decision, DecisionBasis, EvaluationError,
    PermissionEvaluator, TargetOwnership,
};
pub use bridge::{AccessDenied, CallArgs, Guarded, PermissionRequirement, RequirementParseError};
pub use claims::{AuthClaims, Authenticator, TokenValidationError, validate_claims};
pub use context_value::ContextValue;
pub use grants::{EffectiveGrants, GrantCache, PermissionSource, SourceError};
pub use permissions::Permission;
pub use principal::{Principal, TenantMembership};
pub use registry::{GrantSetDraft, NewPermission, RbacError, RbacRegistry};
pub use roles::{ADMIN_ROLE, BASIC_USER_ROLE, Group, READ_ACTION, Role};
pub use tenant_guard::{TenantAccessError, TenantAccessGuard};
pub use tenant_resolver::{DEFAULT_TENANT_HEADER, RequestTenantResolver};
