//! JWT Token Validator
//!
//! Fallback identity source for tokens the cache has not seen. Verifies the
//! signature with the shared secret, requires `sub`, and rejects tokens whose
//! `exp` is in the past. `exp` itself is optional.

use std::collections::HashSet;
use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::token_cache::strip_bearer;
use crate::config::ConfigError;
use crate::error::LedgerError;

/// JWT claims the ledger reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject. The issuer puts the username or user id here.
    pub sub: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl Claims {
    /// `user_id` claim, else a numeric `sub`.
    pub fn resolved_user_id(&self) -> Option<i64> {
        self.user_id.or_else(|| self.sub.parse().ok())
    }
}

pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Build a validator for an HMAC secret.
    ///
    /// # Errors
    /// * `ConfigError::MissingJwtSecret` - empty secret
    /// * `ConfigError::UnsupportedAlgorithm` - not one of HS256/HS384/HS512
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        let algorithm = Algorithm::from_str(algorithm)
            .ok()
            .filter(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
            .ok_or_else(|| ConfigError::UnsupportedAlgorithm(algorithm.to_string()))?;

        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = HashSet::from(["sub".to_string()]);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;

        tracing::info!(?algorithm, "TokenValidator initialized");
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Verify a token (optionally `Bearer `-prefixed) and return its claims,
    /// with `user_id` resolved.
    pub fn validate(&self, token: &str) -> Result<Claims, LedgerError> {
        let token = strip_bearer(token);
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => LedgerError::unauthorized("Token expired"),
                ErrorKind::MissingRequiredClaim(_) => {
                    LedgerError::unauthorized("Invalid token: missing subject")
                }
                _ => LedgerError::unauthorized(format!("Invalid token: {}", e)),
            }
        })?;

        let mut claims = data.claims;
        let user_id = claims
            .resolved_user_id()
            .ok_or_else(|| LedgerError::unauthorized("Invalid token: missing user id"))?;
        claims.user_id = Some(user_id);
        Ok(claims)
    }
}
