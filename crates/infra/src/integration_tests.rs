//! Integration tests for the full decision pipeline.
//!
//! Tests: TenantResolver → TenantGuard → Evaluator → AuditDispatcher → AuditStore
//!
//! Verifies:
//! - Every decision lands exactly once in the audit store with a matching outcome
//! - Pooled request threads never leak a tenant into the next request
//! - Guard rejections happen before any evaluation

#[cfg(test)]
mod tests {
    use std::sync::{Arc, mpsc};
    use std::thread;

    use aegis_auth::{
        AuditOutcome, AuthorizationEvaluator, ContextValue, GrantSetDraft, NewPermission,
        RbacRegistry, RequestTenantResolver, TenantAccessError, TenantAccessGuard, TenantMembership,
    };
    use aegis_core::{EmployeeId, TenantContext, TenantId};
    use aegis_observability::PrometheusMetrics;

    use crate::audit::{AuditDispatcher, AuditDispatcherConfig, InMemoryAuditStore};
    use crate::directory::InMemoryPrincipalDirectory;

    struct Pipeline {
        registry: Arc<RbacRegistry>,
        directory: Arc<InMemoryPrincipalDirectory>,
        store: Arc<InMemoryAuditStore>,
        dispatcher: Arc<AuditDispatcher>,
        evaluator: Arc<AuthorizationEvaluator>,
    }

    fn setup() -> Pipeline {
        let registry = Arc::new(RbacRegistry::new());
        registry.seed_defaults().unwrap();
        let directory = Arc::new(InMemoryPrincipalDirectory::new());
        let store = Arc::new(InMemoryAuditStore::new());
        let metrics = Arc::new(PrometheusMetrics::new());
        let dispatcher = Arc::new(
            AuditDispatcher::spawn(AuditDispatcherConfig::default(), store.clone(), metrics.clone())
                .unwrap(),
        );
        let evaluator = Arc::new(AuthorizationEvaluator::new(
            registry.clone(),
            dispatcher.clone(),
            metrics,
        ));
        Pipeline {
            registry,
            directory,
            store,
            dispatcher,
            evaluator,
        }
    }

    fn grant_scoped_update(p: &Pipeline, username: &str, tenants: &[i64]) {
        let perm = p
            .registry
            .create_permission(NewPermission {
                resource: "ATIVO".into(),
                action: "UPDATE".into(),
                context_key: Some("filialId".into()),
                description: None,
            })
            .unwrap();
        let role = p
            .registry
            .create_role(GrantSetDraft {
                name: "EDITOR".into(),
                description: None,
                permission_ids: Some(vec![perm.id]),
            })
            .unwrap();
        p.directory.register(username).unwrap();
        p.directory.assign_roles(username, [role.id]).unwrap();
        p.directory
            .link_employee(
                username,
                TenantMembership::new(EmployeeId::new(1), tenants.iter().copied().map(TenantId::new)),
            )
            .unwrap();
    }

    #[test]
    fn every_decision_is_persisted_once_with_matching_outcome() {
        let p = setup();
        grant_scoped_update(&p, "bia", &[5]);
        let principal = p.directory.principal("bia").unwrap();

        let mut expected = Vec::new();
        for tenant in 1..=10 {
            let allowed = p.evaluator.has_permission(
                Some(&principal),
                None,
                "ATIVO",
                "UPDATE",
                &ContextValue::Tenant(TenantId::new(tenant)),
            );
            expected.push((tenant.to_string(), AuditOutcome::from_allowed(allowed)));
        }
        p.dispatcher.shutdown();

        let mut recorded: Vec<_> = p
            .store
            .all()
            .into_iter()
            .map(|e| (e.context.unwrap_or_default(), e.outcome))
            .collect();
        recorded.sort();
        expected.sort();
        assert_eq!(recorded, expected);
        assert_eq!(
            recorded.iter().filter(|(_, o)| *o == AuditOutcome::Allow).count(),
            1
        );
    }

    #[test]
    fn pooled_request_thread_does_not_leak_tenant_between_requests() {
        type Request = Box<dyn FnOnce() -> Option<TenantId> + Send>;

        let resolver = RequestTenantResolver::default();
        let (job_tx, job_rx) = mpsc::channel::<Request>();
        let (out_tx, out_rx) = mpsc::channel::<Option<TenantId>>();

        let worker = thread::spawn(move || {
            for job in job_rx {
                let seen = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).unwrap_or(None);
                out_tx.send(seen).unwrap();
            }
        });

        let r1 = resolver.clone();
        job_tx
            .send(Box::new(move || r1.run(Some("5"), TenantContext::get)))
            .unwrap();
        let r2 = resolver.clone();
        job_tx
            .send(Box::new(move || r2.run(Some("6"), || panic!("handler failed"))))
            .unwrap();
        job_tx.send(Box::new(TenantContext::get)).unwrap();
        drop(job_tx);

        let seen: Vec<_> = out_rx.iter().collect();
        worker.join().unwrap();

        assert_eq!(seen, vec![Some(TenantId::new(5)), None, None]);
    }

    #[test]
    fn guard_rejects_before_any_decision_is_made() {
        let p = setup();
        p.directory.register("root").unwrap();
        let admin = p.registry.role_by_name(aegis_auth::ADMIN_ROLE).unwrap().unwrap();
        p.directory.assign_roles("root", [admin.id]).unwrap();
        let principal = p.directory.principal("root").unwrap();

        let guard = TenantAccessGuard::new();
        let resolver = RequestTenantResolver::default();
        let evaluator = p.evaluator.clone();
        let outcome = thread::spawn(move || {
            resolver.run(Some("5"), || {
                guard.check_current(Some(&principal))?;
                Ok::<bool, TenantAccessError>(evaluator.has_permission(
                    Some(&principal),
                    None,
                    "ATIVO",
                    "DELETE",
                    &TenantContext::get().into(),
                ))
            })
        })
        .join()
        .unwrap();
        p.dispatcher.shutdown();

        assert!(matches!(outcome, Err(TenantAccessError::NoEmployeeLink { .. })));
        assert!(p.store.is_empty());
    }
}
