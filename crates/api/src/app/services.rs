//! Service wiring: registry, directory, evaluator and the audit pipeline.

use std::sync::Arc;

use aegis_auth::{
    AuthorizationEvaluator, Authenticator, RbacError, RbacRegistry, RequestTenantResolver,
    TenantAccessGuard,
};
use aegis_infra::{
    AuditDispatcher, AuditDispatcherConfig, InMemoryAuditStore, InMemoryPrincipalDirectory,
    InMemoryTargetOwnership, StaticTokenAuthenticator,
};
use aegis_core::DomainError;
use aegis_observability::PrometheusMetrics;

use crate::config::AegisConfig;
use crate::jwt::Hs256Authenticator;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to start audit workers: {0}")]
    AuditWorkers(#[from] std::io::Error),

    #[error(transparent)]
    Rbac(#[from] RbacError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub struct AppServices {
    pub config: AegisConfig,
    pub registry: Arc<RbacRegistry>,
    pub directory: Arc<InMemoryPrincipalDirectory>,
    pub ownership: Arc<InMemoryTargetOwnership>,
    pub audit_store: Arc<InMemoryAuditStore>,
    pub audit: Arc<AuditDispatcher>,
    pub metrics: Arc<PrometheusMetrics>,
    pub evaluator: Arc<AuthorizationEvaluator>,
    pub resolver: RequestTenantResolver,
    pub guard: TenantAccessGuard,
}

impl AppServices {
    /// Wire every collaborator and seed the built-in roles.
    pub fn build(config: AegisConfig) -> Result<Self, ServiceError> {
        let registry = Arc::new(RbacRegistry::new());
        registry.seed_defaults()?;

        let metrics = Arc::new(PrometheusMetrics::new());
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let audit = Arc::new(AuditDispatcher::spawn(
            AuditDispatcherConfig::default()
                .with_workers(config.audit_workers)
                .with_queue_capacity(config.audit_queue_capacity),
            audit_store.clone(),
            metrics.clone(),
        )?);

        let evaluator = Arc::new(
            AuthorizationEvaluator::new(registry.clone(), audit.clone(), metrics.clone())
                .with_context_max_chars(config.audit_context_max_chars),
        );

        let guard = if config.admin_bypasses_tenant_guard {
            tracing::warn!("tenant guard admin bypass enabled");
            TenantAccessGuard::with_admin_bypass(evaluator.clone())
        } else {
            TenantAccessGuard::new()
        };

        Ok(Self {
            resolver: RequestTenantResolver::new(config.tenant_header.clone()),
            config,
            registry,
            directory: Arc::new(InMemoryPrincipalDirectory::new()),
            ownership: Arc::new(InMemoryTargetOwnership::new()),
            audit_store,
            audit,
            metrics,
            evaluator,
            guard,
        })
    }

    /// HS256 JWT authentication, when a secret is configured.
    pub fn jwt_authenticator(&self) -> Option<Arc<dyn Authenticator>> {
        let secret = self.config.jwt_secret.as_ref()?;
        Some(Arc::new(Hs256Authenticator::new(
            secret.as_bytes(),
            self.directory.clone(),
        )))
    }

    /// Static token table over this directory; tokens are issued by the caller.
    pub fn static_authenticator(&self) -> Arc<StaticTokenAuthenticator> {
        Arc::new(StaticTokenAuthenticator::new(self.directory.clone()))
    }

    /// Register `username` holding the administrator role.
    pub fn seed_admin(&self, username: &str) -> Result<(), ServiceError> {
        let (admin, _) = self.registry.seed_defaults()?;
        self.directory.register(username)?;
        self.directory.assign_roles(username, [admin])?;
        Ok(())
    }

    /// Flush queued audit entries and stop the workers.
    pub fn shutdown(&self) {
        self.audit.shutdown();
    }
}
