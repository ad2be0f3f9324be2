//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: registry, directory, evaluator and audit pipeline
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use aegis_auth::Authenticator;

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>, authenticator: Arc<dyn Authenticator>) -> Router {
    let auth_state = middleware::AuthState { authenticator };
    let tenant_state = middleware::TenantState {
        resolver: services.resolver.clone(),
        guard: services.guard.clone(),
    };

    // Protected routes: authentication first, then the tenant guard.
    let protected = routes::router()
        .layer(axum::middleware::from_fn_with_state(
            tenant_state,
            middleware::tenant_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
