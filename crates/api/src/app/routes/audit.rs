use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use aegis_infra::AuditStore;

use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::{PrincipalContext, RequestTenant};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /admin/audit - decision records, newest first
pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AuditQuery>,
) -> Response {
    if let Err(denied) = authz::require(&*services.evaluator, &principal, &tenant, &authz::AUDIT_READ) {
        return denied;
    }

    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    match services.audit_store.page(page, size) {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to read audit trail");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        }
    }
}
