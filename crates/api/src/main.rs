use std::sync::Arc;

use anyhow::Context;

use aegis_api::app::{build_app, services::AppServices};
use aegis_api::config::AegisConfig;
use aegis_auth::Authenticator;

const DEV_ADMIN: &str = "admin";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aegis_observability::init();

    let config = AegisConfig::from_env();
    let bind_addr = config.bind_addr;
    let services = Arc::new(AppServices::build(config).context("failed to wire services")?);

    let authenticator: Arc<dyn Authenticator> = match services.jwt_authenticator() {
        Some(jwt) => jwt,
        None => {
            let token = std::env::var("AEGIS_DEV_TOKEN").unwrap_or_else(|_| "dev-admin-token".to_string());
            tracing::warn!("AEGIS_JWT_SECRET not set; accepting a static dev token for '{DEV_ADMIN}'");
            services.seed_admin(DEV_ADMIN).context("failed to seed dev admin")?;
            let static_tokens = services.static_authenticator();
            static_tokens.issue_for(token, DEV_ADMIN, chrono::Duration::hours(12));
            let authenticator: Arc<dyn Authenticator> = static_tokens;
            authenticator
        }
    };

    let app = build_app(services.clone(), authenticator);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    services.shutdown();
    tracing::info!("shut down");
    Ok(())
}
