use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use aegis_auth::{Authenticator, RequestTenantResolver, TenantAccessGuard, TokenValidationError};

use crate::app::errors;
use crate::context::{PrincipalContext, RequestTenant};

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<dyn Authenticator>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = extract_bearer(req.headers())
        .and_then(|token| state.authenticator.authenticate(token, Utc::now()))
        .map_err(|e| {
            tracing::debug!(error = %e, "authentication failed");
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct TenantState {
    pub resolver: RequestTenantResolver,
    pub guard: TenantAccessGuard,
}

/// Resolve the tenant header and enforce membership before any handler runs.
///
/// Must run after [`auth_middleware`].
pub async fn tenant_middleware(
    State(state): State<TenantState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let tenant = {
        let raw = req
            .headers()
            .get(state.resolver.header_name())
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        state.resolver.resolve(raw.as_deref())
    };

    let checked = state.guard.check(
        tenant,
        req.extensions()
            .get::<PrincipalContext>()
            .map(PrincipalContext::principal),
    );
    if let Err(e) = checked {
        return errors::json_error(StatusCode::FORBIDDEN, "tenant_access_denied", e.to_string());
    }

    req.extensions_mut().insert(RequestTenant::new(tenant));
    next.run(req).await
}

/// `Missing` when no usable credential was sent, `Invalid` when the header is
/// present but not a bearer credential.
fn extract_bearer(headers: &HeaderMap) -> Result<&str, TokenValidationError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(TokenValidationError::Missing)?;

    let header = header.to_str().map_err(|_| TokenValidationError::Invalid)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(TokenValidationError::Invalid)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(TokenValidationError::Missing);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    fn with_auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn absent_or_blank_credentials_are_missing() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(TokenValidationError::Missing));
        assert_eq!(extract_bearer(&with_auth("Bearer    ")), Err(TokenValidationError::Missing));
    }

    #[test]
    fn non_bearer_schemes_are_invalid() {
        assert_eq!(extract_bearer(&with_auth("Basic cm9vdDpyb290")), Err(TokenValidationError::Invalid));
    }

    #[test]
    fn bearer_token_is_trimmed() {
        assert_eq!(extract_bearer(&with_auth("Bearer  tok-1 ")), Ok("tok-1"));
    }
}
