//! The authorization decision core.
//!
//! A decision is a pure function of the principal's resolved permissions, the
//! requested resource/action, the call-site context value and the principal's
//! tenant memberships. Every decision is audited and metered exactly once;
//! neither side effect can change the outcome.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use aegis_observability::{MetricsRecorder, Tags};

use crate::audit::{AuditLogEntry, AuditSink, DEFAULT_CONTEXT_MAX_CHARS};
use crate::grants::{GrantCache, PermissionSource, SourceError};
use crate::{ADMIN_ROLE, BASIC_USER_ROLE, ContextValue, Principal, READ_ACTION};

pub const AUTHZ_COUNTER: &str = "aegis_authz_total";
pub const AUTHZ_TIMER: &str = "aegis_authz_eval_timer";

const ANONYMOUS: &str = "anonymous";

/// Single decision entry point shared by every call site.
pub trait PermissionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        principal: Option<&Principal>,
        target_id: Option<&str>,
        resource: &str,
        action: &str,
        context: &ContextValue,
    ) -> bool;
}

impl<T: PermissionEvaluator + ?Sized> PermissionEvaluator for Arc<T> {
    fn evaluate(
        &self,
        principal: Option<&Principal>,
        target_id: Option<&str>,
        resource: &str,
        action: &str,
        context: &ContextValue,
    ) -> bool {
        (**self).evaluate(principal, target_id, resource, action, context)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("evaluation panicked: {0}")]
    Panicked(String),
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    Unauthenticated,
    AdminBypass,
    Granted,
    BasicUserRead,
    NoMatchingPermission,
    ContextMissing,
    ContextMismatch,
    TargetNotFound,
    InternalError,
}

impl DecisionBasis {
    pub fn allows(&self) -> bool {
        matches!(self, Self::AdminBypass | Self::Granted | Self::BasicUserRead)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub basis: DecisionBasis,
    pub reason: String,
}

impl Decision {
    fn new(basis: DecisionBasis, reason: impl Into<String>) -> Self {
        Self {
            allowed: basis.allows(),
            basis,
            reason: reason.into(),
        }
    }
}

/// Resolves which tenant(s) own a target, e.g. the branch an asset belongs to.
pub trait TargetOwnership: Send + Sync {
    /// `None` when the target does not exist.
    fn owning_context(&self, target_id: &str) -> Option<ContextValue>;
}

impl<F> TargetOwnership for F
where
    F: Fn(&str) -> Option<ContextValue> + Send + Sync,
{
    fn owning_context(&self, target_id: &str) -> Option<ContextValue> {
        self(target_id)
    }
}

pub struct AuthorizationEvaluator {
    source: Arc<dyn PermissionSource>,
    cache: GrantCache,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsRecorder>,
    context_max_chars: usize,
}

impl core::fmt::Debug for AuthorizationEvaluator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationEvaluator")
            .field("cache", &self.cache)
            .field("context_max_chars", &self.context_max_chars)
            .finish_non_exhaustive()
    }
}

impl AuthorizationEvaluator {
    pub fn new(
        source: Arc<dyn PermissionSource>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            source,
            cache: GrantCache::default(),
            audit,
            metrics,
            context_max_chars: DEFAULT_CONTEXT_MAX_CHARS,
        }
    }

    pub fn with_context_max_chars(mut self, max: usize) -> Self {
        self.context_max_chars = max;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = GrantCache::new(capacity);
        self
    }

    pub fn has_permission(
        &self,
        principal: Option<&Principal>,
        target_id: Option<&str>,
        resource: &str,
        action: &str,
        context: &ContextValue,
    ) -> bool {
        self.decide(principal, target_id, resource, action, context).allowed
    }

    /// Evaluate and explain. Audited and metered like [`Self::has_permission`].
    pub fn decide(
        &self,
        principal: Option<&Principal>,
        _target_id: Option<&str>,
        resource: &str,
        action: &str,
        context: &ContextValue,
    ) -> Decision {
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.evaluate_rules(principal, resource, action, context)
        }))
        .unwrap_or_else(|payload| Err(EvaluationError::Panicked(panic_message(payload.as_ref()))));

        let decision = outcome.unwrap_or_else(|err| {
            let reason = format!("Error evaluating permission: {err}");
            tracing::error!(resource, action, error = %err, "[AUTHZ] {reason}");
            Decision::new(DecisionBasis::InternalError, reason)
        });

        self.observe(principal, resource, action, context, &decision, started.elapsed());
        decision
    }

    /// Evaluate against the tenant(s) owning `target_id`; unknown targets deny.
    pub fn has_owned_target_permission(
        &self,
        principal: Option<&Principal>,
        target_id: &str,
        resource: &str,
        action: &str,
        ownership: &dyn TargetOwnership,
    ) -> bool {
        let started = Instant::now();

        let owner = panic::catch_unwind(AssertUnwindSafe(|| ownership.owning_context(target_id)));
        match owner {
            Ok(Some(context)) => {
                self.decide(principal, Some(target_id), resource, action, &context)
                    .allowed
            }
            Ok(None) => {
                let decision = Decision::new(
                    DecisionBasis::TargetNotFound,
                    format!("Target {target_id} not found for {resource}/{action}"),
                );
                tracing::debug!(target_id, resource, action, "[AUTHZ] Deny: {}", decision.reason);
                self.observe(principal, resource, action, &ContextValue::Absent, &decision, started.elapsed());
                false
            }
            Err(payload) => {
                let decision = Decision::new(
                    DecisionBasis::InternalError,
                    format!(
                        "Error resolving owner of {target_id}: {}",
                        panic_message(payload.as_ref())
                    ),
                );
                tracing::error!(target_id, resource, action, "[AUTHZ] {}", decision.reason);
                self.observe(principal, resource, action, &ContextValue::Absent, &decision, started.elapsed());
                false
            }
        }
    }

    /// Whether the principal holds the administrator authority. Not audited.
    pub fn is_administrator(&self, principal: &Principal) -> bool {
        match self.resolve_authorities(principal) {
            Ok(authorities) => authorities.contains(ADMIN_ROLE),
            Err(err) => {
                tracing::error!(username = %principal.username, error = %err, "failed to resolve authorities");
                false
            }
        }
    }

    /// Role names held by the principal.
    ///
    /// The deprecated single-role string only counts when no role set is
    /// assigned.
    pub fn resolve_authorities(&self, principal: &Principal) -> Result<BTreeSet<String>, EvaluationError> {
        if principal.roles.is_empty() {
            return Ok(principal.legacy_role.iter().cloned().collect());
        }
        let grants = self
            .cache
            .get_or_resolve(self.source.as_ref(), &principal.roles, &principal.groups)?;
        Ok(grants.role_names.clone())
    }

    fn evaluate_rules(
        &self,
        principal: Option<&Principal>,
        resource: &str,
        action: &str,
        context: &ContextValue,
    ) -> Result<Decision, EvaluationError> {
        let Some(principal) = principal.filter(|p| p.authenticated) else {
            tracing::debug!(resource, action, "[AUTHZ] Deny: Unauthenticated");
            return Ok(Decision::new(DecisionBasis::Unauthenticated, "Unauthenticated"));
        };
        let username = principal.username.as_str();

        let grants = self
            .cache
            .get_or_resolve(self.source.as_ref(), &principal.roles, &principal.groups)?;

        let legacy;
        let authorities = if principal.roles.is_empty() {
            legacy = principal.legacy_role.iter().cloned().collect::<BTreeSet<_>>();
            &legacy
        } else {
            &grants.role_names
        };

        if authorities.contains(ADMIN_ROLE) {
            tracing::debug!(username, "[AUTHZ] Allow: Admin Bypass");
            return Ok(Decision::new(
                DecisionBasis::AdminBypass,
                format!("Admin bypass for {username}"),
            ));
        }

        let allowed_tenants = principal.tenant_ids();
        let mut basis = DecisionBasis::NoMatchingPermission;
        let mut required_key: Option<&str> = None;

        for permission in grants.permissions.iter().filter(|p| p.matches(resource, action)) {
            match permission.context_key() {
                None => {
                    return Ok(Decision::new(
                        DecisionBasis::Granted,
                        format!("{username} holds {permission}"),
                    ));
                }
                Some(key) if context.within(&allowed_tenants) => {
                    return Ok(Decision::new(
                        DecisionBasis::Granted,
                        format!("{username} holds {permission} and context {context} matches {key}"),
                    ));
                }
                Some(key) => {
                    required_key.get_or_insert(key);
                    basis = if context.is_absent() {
                        DecisionBasis::ContextMissing
                    } else {
                        DecisionBasis::ContextMismatch
                    };
                }
            }
        }

        if grants.permissions.is_empty()
            && authorities.contains(BASIC_USER_ROLE)
            && action.eq_ignore_ascii_case(READ_ACTION)
        {
            tracing::debug!(username, resource, "[AUTHZ] Allow: basic user read");
            return Ok(Decision::new(
                DecisionBasis::BasicUserRead,
                format!("{username} is a basic user reading {resource}"),
            ));
        }

        let key = required_key.unwrap_or("");
        let reason = match basis {
            DecisionBasis::ContextMissing => {
                format!("Context required ({key}) but missing for {username} on {resource}/{action}")
            }
            DecisionBasis::ContextMismatch => {
                format!("Context mismatch. User {username} has no access to context {context}")
            }
            _ => format!("No permission found for {username} on {resource}/{action}"),
        };
        if basis == DecisionBasis::ContextMissing {
            tracing::warn!(username, resource, action, "[AUTHZ] Deny: {reason}");
        } else {
            tracing::debug!(username, resource, action, "[AUTHZ] Deny: {reason}");
        }
        Ok(Decision::new(basis, reason))
    }

    fn observe(
        &self,
        principal: Option<&Principal>,
        resource: &str,
        action: &str,
        context: &ContextValue,
        decision: &Decision,
        elapsed: Duration,
    ) {
        let username = principal.map_or(ANONYMOUS, |p| p.username.as_str());
        let details = (!decision.allowed).then(|| decision.reason.clone());

        let audited = panic::catch_unwind(AssertUnwindSafe(|| {
            let entry = AuditLogEntry::new(
                username,
                resource,
                action,
                context.audit_repr(),
                decision.allowed,
                details,
                self.context_max_chars,
            );
            self.audit.record(entry)
        }));
        match audited {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "failed to trigger audit log"),
            Err(payload) => {
                tracing::error!(panic = %panic_message(payload.as_ref()), "failed to trigger audit log")
            }
        }

        let metered = panic::catch_unwind(AssertUnwindSafe(|| {
            let outcome = if decision.allowed { "allow" } else { "deny" };
            let counter_tags = Tags::new()
                .with("outcome", outcome)
                .with("resource", resource)
                .with("action", action);
            let timer_tags = Tags::new().with("resource", resource).with("action", action);
            self.metrics.increment_counter(AUTHZ_COUNTER, &counter_tags)?;
            self.metrics.record_timer(AUTHZ_TIMER, &timer_tags, elapsed)
        }));
        match metered {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::debug!(error = %err, "[AUTHZ][METRICS] failed to record metrics"),
            Err(_) => tracing::debug!("[AUTHZ][METRICS] metrics recorder panicked"),
        }
    }
}

impl PermissionEvaluator for AuthorizationEvaluator {
    fn evaluate(
        &self,
        principal: Option<&Principal>,
        target_id: Option<&str>,
        resource: &str,
        action: &str,
        context: &ContextValue,
    ) -> bool {
        self.has_permission(principal, target_id, resource, action, context)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
