use axum::{routing::get, Router};

pub mod audit;
pub mod explain;
pub mod rbac;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/authz", explain::router())
        .nest("/admin/rbac", rbac::router())
        .nest("/admin/users", users::router())
        .route("/admin/audit", get(audit::list_entries))
}
