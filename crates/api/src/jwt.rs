//! HS256 bearer tokens carrying [`AuthClaims`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use aegis_auth::{AuthClaims, Authenticator, Principal, TokenValidationError, validate_claims};
use aegis_infra::InMemoryPrincipalDirectory;

pub struct Hs256Authenticator {
    key: DecodingKey,
    validation: Validation,
    directory: Arc<InMemoryPrincipalDirectory>,
}

impl Hs256Authenticator {
    pub fn new(secret: &[u8], directory: Arc<InMemoryPrincipalDirectory>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Timestamps are RFC 3339 claims checked by `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
            directory,
        }
    }
}

impl Authenticator for Hs256Authenticator {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenValidationError> {
        let data = jsonwebtoken::decode::<AuthClaims>(token, &self.key, &self.validation).map_err(|err| {
            tracing::debug!(error = %err, "jwt rejected");
            TokenValidationError::Invalid
        })?;

        validate_claims(&data.claims, now)?;

        self.directory
            .principal(&data.claims.sub)
            .ok_or(TokenValidationError::Invalid)
    }
}
