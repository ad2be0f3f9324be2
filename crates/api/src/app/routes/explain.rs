//! Authorization introspection: "why was this request denied?"
//!
//! Both endpoints evaluate for the calling principal only, and every
//! evaluation is audited like any other decision.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use aegis_auth::ContextValue;

use crate::app::services::AppServices;
use crate::context::{PrincipalContext, RequestTenant};

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub resource: String,
    pub action: String,
    /// Tenant to check against; defaults to the request tenant.
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub resource: String,
    pub action: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/explain", get(explain))
        .route("/targets/:target_id", get(check_target))
}

/// GET /authz/explain - the full decision for the caller
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> Response {
    let context = match query.context {
        Some(raw) => ContextValue::Raw(raw),
        None => ContextValue::from(tenant.tenant_id()),
    };

    let decision = services.evaluator.decide(
        Some(principal.principal()),
        None,
        &query.resource,
        &query.action,
        &context,
    );

    Json(serde_json::json!({
        "username": principal.username(),
        "resource": query.resource,
        "action": query.action,
        "context": context.audit_repr(),
        "decision": decision,
    }))
    .into_response()
}

/// GET /authz/targets/:target_id - check against the tenant owning a target
pub async fn check_target(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(target_id): Path<String>,
    Query(query): Query<TargetQuery>,
) -> Response {
    let allowed = services.evaluator.has_owned_target_permission(
        Some(principal.principal()),
        &target_id,
        &query.resource,
        &query.action,
        &*services.ownership,
    );

    Json(serde_json::json!({
        "target_id": target_id,
        "resource": query.resource,
        "action": query.action,
        "allowed": allowed,
    }))
    .into_response()
}
