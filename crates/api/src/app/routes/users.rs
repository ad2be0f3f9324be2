//! Principal assignments: roles, groups and the employee link.
//!
//! Administrator only. These endpoints decide who holds `ROLE_ADMIN` and
//! which tenants a user belongs to.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::put,
    Json, Router,
};
use serde::Deserialize;

use aegis_auth::TenantMembership;
use aegis_core::{DomainResult, EmployeeId, GroupId, RoleId, TenantId};

use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

#[derive(Debug, Deserialize)]
pub struct AssignIds {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeLink {
    pub employee_id: i64,
    pub tenants: Vec<i64>,
}

pub fn router() -> Router {
    Router::new()
        .route("/:username", put(register_user))
        .route("/:username/roles", put(assign_roles))
        .route("/:username/groups", put(assign_groups))
        .route("/:username/employee", put(link_employee))
}

fn applied(result: DomainResult<()>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// PUT /admin/users/:username - create the user if missing
pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(username): Path<String>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    applied(services.directory.register(&username))
}

/// PUT /admin/users/:username/roles - replace the role set
pub async fn assign_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(username): Path<String>,
    Json(body): Json<AssignIds>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    let mut roles = Vec::with_capacity(body.ids.len());
    for id in body.ids {
        match services.registry.get_role(RoleId::new(id)) {
            Ok(role) => roles.push(role.id),
            Err(e) => return errors::rbac_error_to_response(e),
        }
    }
    applied(services.directory.assign_roles(&username, roles))
}

/// PUT /admin/users/:username/groups - replace the group set
pub async fn assign_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(username): Path<String>,
    Json(body): Json<AssignIds>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    let mut groups = Vec::with_capacity(body.ids.len());
    for id in body.ids {
        match services.registry.get_group(GroupId::new(id)) {
            Ok(group) => groups.push(group.id),
            Err(e) => return errors::rbac_error_to_response(e),
        }
    }
    applied(services.directory.assign_groups(&username, groups))
}

/// PUT /admin/users/:username/employee - set the tenants the user works in
pub async fn link_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(username): Path<String>,
    Json(body): Json<EmployeeLink>,
) -> Response {
    if let Err(denied) = authz::require_admin(&services.evaluator, &principal) {
        return denied;
    }
    let membership = TenantMembership::new(
        EmployeeId::new(body.employee_id),
        body.tenants.into_iter().map(TenantId::new),
    );
    applied(services.directory.link_employee(&username, membership))
}
