use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use aegis_auth::RbacError;
use aegis_core::DomainError;

pub fn rbac_error_to_response(err: RbacError) -> axum::response::Response {
    match &err {
        RbacError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        RbacError::DuplicateName { .. } => json_error(StatusCode::CONFLICT, "duplicate_name", err.to_string()),
        RbacError::PermissionInUse { .. } => {
            json_error(StatusCode::CONFLICT, "permission_in_use", err.to_string())
        }
        RbacError::UnknownPermissions(_) => {
            json_error(StatusCode::BAD_REQUEST, "unknown_permissions", err.to_string())
        }
        RbacError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
        RbacError::Poisoned => {
            tracing::error!(error = %err, "rbac registry unavailable");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
