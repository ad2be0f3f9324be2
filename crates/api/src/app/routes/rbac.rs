//! RBAC administration: roles, groups and permissions.
//!
//! Reads require `RBAC/READ` checked against the request tenant. Changes
//! require the administrator authority: a role edit can grant anything, so
//! no tenant-scoped permission is enough. Every change bumps the registry
//! generation, so cached grants are rebuilt on the next decision.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use aegis_auth::{GrantSetDraft, NewPermission, RbacError};
use aegis_core::{GroupId, PermissionId, RoleId};

use crate::app::{errors, services::AppServices};
use crate::authz::{self, RBAC_READ};
use crate::context::{PrincipalContext, RequestTenant};

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/:id", get(get_group).put(update_group).delete(delete_group))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route("/permissions/:id", get(get_permission).delete(delete_permission))
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, RbacError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::rbac_error_to_response(e),
    }
}

fn deleted(result: Result<(), RbacError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::rbac_error_to_response(e),
    }
}

// ── Roles ───────────────────────────────────────────────────────────────────

/// GET /admin/rbac/roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &RBAC_READ) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.list_roles())
}

/// GET /admin/rbac/roles/:id
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &RBAC_READ) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.get_role(RoleId::new(id)))
}

/// POST /admin/rbac/roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(draft): Json<GrantSetDraft>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    let created = services.registry.create_role(draft);
    if let Ok(role) = &created {
        tracing::info!(actor = principal.username(), role = %role.name, "role created");
    }
    respond(StatusCode::CREATED, created)
}

/// PUT /admin/rbac/roles/:id
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    Json(draft): Json<GrantSetDraft>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.update_role(RoleId::new(id), draft))
}

/// DELETE /admin/rbac/roles/:id
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    deleted(services.registry.delete_role(RoleId::new(id)))
}

// ── Groups ──────────────────────────────────────────────────────────────────

/// GET /admin/rbac/groups
pub async fn list_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &RBAC_READ) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.list_groups())
}

/// GET /admin/rbac/groups/:id
pub async fn get_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &RBAC_READ) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.get_group(GroupId::new(id)))
}

/// POST /admin/rbac/groups
pub async fn create_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(draft): Json<GrantSetDraft>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    respond(StatusCode::CREATED, services.registry.create_group(draft))
}

/// PUT /admin/rbac/groups/:id
pub async fn update_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    Json(draft): Json<GrantSetDraft>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.update_group(GroupId::new(id), draft))
}

/// DELETE /admin/rbac/groups/:id
pub async fn delete_group(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    deleted(services.registry.delete_group(GroupId::new(id)))
}

// ── Permissions ─────────────────────────────────────────────────────────────

/// GET /admin/rbac/permissions
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &RBAC_READ) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.list_permissions())
}

/// GET /admin/rbac/permissions/:id
pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &RBAC_READ) {
        return denied;
    }
    respond(StatusCode::OK, services.registry.get_permission(PermissionId::new(id)))
}

/// POST /admin/rbac/permissions
pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(new): Json<NewPermission>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    respond(StatusCode::CREATED, services.registry.create_permission(new))
}

/// DELETE /admin/rbac/permissions/:id
///
/// Refused with 409 while any role or group still grants the permission.
pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    deleted(services.registry.delete_permission(PermissionId::new(id)))
}
