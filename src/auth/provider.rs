//! Identity providers
//!
//! A bearer token is resolved by an ordered chain of providers: the token
//! cache first, then JWT validation. The first provider that recognises the
//! token wins; if none does, the last provider's error is returned.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::token_cache::TokenCache;
use super::validator::TokenValidator;
use crate::error::LedgerError;

/// Where an identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    Cache,
    Jwt,
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub token_type: Option<String>,
    pub source: AuthSource,
}

pub trait IdentityProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    fn resolve(&self, token: &str) -> Result<AuthenticatedUser, LedgerError>;
}

pub struct CacheProvider {
    cache: Arc<TokenCache>,
}

impl CacheProvider {
    pub fn new(cache: Arc<TokenCache>) -> Self {
        Self { cache }
    }
}

impl IdentityProvider for CacheProvider {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn resolve(&self, token: &str) -> Result<AuthenticatedUser, LedgerError> {
        let entry = self
            .cache
            .lookup(token)
            .ok_or_else(|| LedgerError::unauthorized("Token not in cache"))?;
        Ok(AuthenticatedUser {
            user_id: entry.user_id,
            username: Some(entry.username),
            email: None,
            token_type: entry.token_type,
            source: AuthSource::Cache,
        })
    }
}

pub struct JwtProvider {
    validator: TokenValidator,
}

impl JwtProvider {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }
}

impl IdentityProvider for JwtProvider {
    fn name(&self) -> &'static str {
        "jwt"
    }

    fn resolve(&self, token: &str) -> Result<AuthenticatedUser, LedgerError> {
        let claims = self.validator.validate(token)?;
        let user_id = claims
            .resolved_user_id()
            .ok_or_else(|| LedgerError::unauthorized("Invalid token: missing user id"))?;
        Ok(AuthenticatedUser {
            user_id,
            username: Some(claims.sub),
            email: claims.email,
            token_type: None,
            source: AuthSource::Jwt,
        })
    }
}

pub struct AuthChain {
    providers: Vec<Arc<dyn IdentityProvider>>,
}

impl AuthChain {
    pub fn new(providers: Vec<Arc<dyn IdentityProvider>>) -> Self {
        Self { providers }
    }

    /// Cache, then JWT.
    pub fn standard(cache: Arc<TokenCache>, validator: TokenValidator) -> Self {
        Self::new(vec![
            Arc::new(CacheProvider::new(cache)),
            Arc::new(JwtProvider::new(validator)),
        ])
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, LedgerError> {
        let mut last_err = LedgerError::unauthorized("Invalid authentication credentials");
        for provider in &self.providers {
            match provider.resolve(token) {
                Ok(user) => {
                    tracing::debug!(
                        provider = provider.name(),
                        user_id = user.user_id,
                        "Request authenticated"
                    );
                    return Ok(user);
                }
                Err(e) => {
                    tracing::debug!(provider = provider.name(), error = %e, "Provider declined token");
                    last_err = e;
                }
            }
        }
        tracing::warn!(error = %last_err, "Authentication failed");
        Err(last_err)
    }
}
