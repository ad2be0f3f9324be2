//! API-side permission checks.
//!
//! Handlers declare a [`PermissionRequirement`] and call [`require`] before
//! doing any work. The request tenant is bound as the `tenant` argument, so
//! requirements scoped with `.context_arg("tenant")` are checked against it.

use std::sync::LazyLock;

use axum::http::StatusCode;
use axum::response::Response;

use aegis_auth::{AuthorizationEvaluator, CallArgs, PermissionEvaluator, PermissionRequirement};

use crate::app::errors;
use crate::context::{PrincipalContext, RequestTenant};

pub const TENANT_ARG: &str = "tenant";

pub static RBAC_READ: LazyLock<PermissionRequirement> =
    LazyLock::new(|| PermissionRequirement::new("RBAC", "READ").context_arg(TENANT_ARG));

pub static AUDIT_READ: LazyLock<PermissionRequirement> =
    LazyLock::new(|| PermissionRequirement::new("AUDIT", "READ").context_arg(TENANT_ARG));

/// Named arguments every request exposes to requirements.
pub fn request_args(tenant: &RequestTenant) -> CallArgs {
    CallArgs::new().with(TENANT_ARG, tenant.tenant_id())
}

/// Check `requirement` for the current request; a denial becomes a 403.
pub fn require(
    evaluator: &dyn PermissionEvaluator,
    principal: &PrincipalContext,
    tenant: &RequestTenant,
    requirement: &PermissionRequirement,
) -> Result<(), Response> {
    requirement
        .check(evaluator, Some(principal.principal()), &request_args(tenant))
        .map_err(|denied| {
            errors::json_error(StatusCode::FORBIDDEN, "forbidden", denied.to_string())
        })
}

/// Administrator-only surface. Not satisfiable by any tenant-scoped grant.
pub fn require_admin(
    evaluator: &AuthorizationEvaluator,
    principal: &PrincipalContext,
) -> Result<(), Response> {
    if evaluator.is_administrator(principal.principal()) {
        return Ok(());
    }
    tracing::warn!(username = principal.username(), "administrator authority required");
    Err(errors::json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        "administrator authority required",
    ))
}
