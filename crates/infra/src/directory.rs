//! Principal directory and development authenticator.
//!
//! The directory holds each user's role/group assignments and employee link.
//! Grant caches are keyed by the assignment set itself, so reassigning a
//! user's roles or groups takes effect on the next decision.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use aegis_auth::{
    AuthClaims, Authenticator, Principal, TenantMembership, TokenValidationError, validate_claims,
};
use aegis_core::{DomainError, DomainResult, GroupId, RoleId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct UserRecord {
    roles: BTreeSet<RoleId>,
    groups: BTreeSet<GroupId>,
    employee: Option<TenantMembership>,
    legacy_role: Option<String>,
}

/// In-memory user directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the user if missing. Existing assignments are kept.
    pub fn register(&self, username: &str) -> DomainResult<()> {
        let mut users = self.write()?;
        users.entry(username.to_string()).or_insert_with(|| UserRecord {
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
            employee: None,
            legacy_role: None,
        });
        Ok(())
    }

    /// Replace the user's role assignment.
    pub fn assign_roles(
        &self,
        username: &str,
        roles: impl IntoIterator<Item = RoleId>,
    ) -> DomainResult<()> {
        self.update(username, |u| u.roles = roles.into_iter().collect())?;
        tracing::info!(username, "roles reassigned");
        Ok(())
    }

    /// Replace the user's group assignment.
    pub fn assign_groups(
        &self,
        username: &str,
        groups: impl IntoIterator<Item = GroupId>,
    ) -> DomainResult<()> {
        self.update(username, |u| u.groups = groups.into_iter().collect())?;
        tracing::info!(username, "groups reassigned");
        Ok(())
    }

    pub fn link_employee(&self, username: &str, membership: TenantMembership) -> DomainResult<()> {
        self.update(username, |u| u.employee = Some(membership))
    }

    pub fn set_legacy_role(&self, username: &str, role: impl Into<String>) -> DomainResult<()> {
        let role = role.into();
        self.update(username, |u| u.legacy_role = Some(role))
    }

    /// The authenticated principal for `username`, if known.
    pub fn principal(&self, username: &str) -> Option<Principal> {
        let users = self.users.read().ok()?;
        let user = users.get(username)?;
        Some(Principal {
            username: username.to_string(),
            authenticated: true,
            roles: user.roles.clone(),
            groups: user.groups.clone(),
            employee: user.employee.clone(),
            legacy_role: user.legacy_role.clone(),
        })
    }

    fn update(&self, username: &str, f: impl FnOnce(&mut UserRecord)) -> DomainResult<()> {
        let mut users = self.write()?;
        let user = users
            .get_mut(username)
            .ok_or_else(|| DomainError::not_found(format!("user '{username}'")))?;
        f(user);
        Ok(())
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<String, UserRecord>>> {
        self.users
            .write()
            .map_err(|_| DomainError::conflict("principal directory lock poisoned"))
    }
}

/// Fixed token table mapping opaque bearer tokens to users.
#[derive(Debug)]
pub struct StaticTokenAuthenticator {
    directory: Arc<InMemoryPrincipalDirectory>,
    tokens: RwLock<HashMap<String, AuthClaims>>,
}

impl StaticTokenAuthenticator {
    pub fn new(directory: Arc<InMemoryPrincipalDirectory>) -> Self {
        Self {
            directory,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, token: impl Into<String>, claims: AuthClaims) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.into(), claims);
        }
    }

    /// Issue a token for `username` valid for `ttl` from now.
    pub fn issue_for(&self, token: impl Into<String>, username: &str, ttl: chrono::Duration) {
        let now = Utc::now();
        self.issue(
            token,
            AuthClaims {
                sub: username.to_string(),
                issued_at: now,
                expires_at: now + ttl,
            },
        );
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenValidationError> {
        let claims = self
            .tokens
            .read()
            .map_err(|_| TokenValidationError::Invalid)?
            .get(token)
            .cloned()
            .ok_or(TokenValidationError::Invalid)?;

        validate_claims(&claims, now)?;

        self.directory
            .principal(&claims.sub)
            .ok_or(TokenValidationError::Invalid)
    }
}
