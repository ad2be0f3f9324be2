use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::app::{errors, services::AppServices};
use crate::context::{PrincipalContext, RequestTenant};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Prometheus text exposition of the decision and audit metrics.
pub async fn metrics(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render metrics");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        }
    }
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<RequestTenant>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let authorities = match services.evaluator.resolve_authorities(principal.principal()) {
        Ok(authorities) => authorities,
        Err(e) => {
            tracing::error!(username = principal.username(), error = %e, "failed to resolve authorities");
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "failed to resolve authorities",
            );
        }
    };

    Json(serde_json::json!({
        "username": principal.username(),
        "authorities": authorities,
        "tenants": principal.principal().tenant_ids(),
        "tenant_id": tenant.tenant_id(),
    }))
    .into_response()
}
