//! Token cache fed by the token distribution channel.
//!
//! Holds at most one live token per user. Storing a new token for a user
//! evicts the previous one. Both indexes sit behind one lock so a reader
//! never sees a token without its reverse mapping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, info};

use crate::messaging::event::TokenEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub user_id: i64,
    pub username: String,
    pub token_type: Option<String>,
    pub issued_at: Option<String>,
    pub expires_in: Option<f64>,
    pub received_at: DateTime<Utc>,
}

#[derive(Default)]
struct Indexes {
    tokens: HashMap<String, CachedToken>,
    user_tokens: HashMap<i64, String>,
}

#[derive(Default)]
pub struct TokenCache {
    inner: RwLock<Indexes>,
}

/// Strip an optional `Bearer ` prefix (scheme matched case-insensitively).
pub fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => raw,
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the event's token, evicting the user's previous token.
    ///
    /// Returns `false` (and logs) when a required field is missing.
    /// Storing the same event twice leaves the cache as after the first.
    pub fn store(&self, event: &TokenEvent) -> bool {
        let (Some(token), Some(user_id), Some(username)) =
            (event.token.as_deref(), event.user_id, event.username.as_deref())
        else {
            error!(
                has_token = event.token.is_some(),
                user_id = ?event.user_id,
                "Invalid token data received, dropping"
            );
            return false;
        };
        if token.is_empty() || username.is_empty() {
            error!(user_id, "Invalid token data received, dropping");
            return false;
        }

        let entry = CachedToken {
            user_id,
            username: username.to_string(),
            token_type: event.token_type.clone(),
            issued_at: event.issued_at.clone(),
            expires_in: event.expires_in,
            received_at: Utc::now(),
        };

        let mut guard = self.inner.write();
        // Token reissued to another user: detach it from the old owner
        if let Some(owner) = guard.tokens.get(token).map(|e| e.user_id) {
            if owner != user_id
                && guard.user_tokens.get(&owner).map(String::as_str) == Some(token)
            {
                guard.user_tokens.remove(&owner);
            }
        }
        if let Some(previous) = guard.user_tokens.insert(user_id, token.to_string()) {
            if previous != token {
                guard.tokens.remove(&previous);
            }
        }
        guard.tokens.insert(token.to_string(), entry);
        drop(guard);

        info!(user_id, username, "Token stored");
        true
    }

    pub fn lookup(&self, token: &str) -> Option<CachedToken> {
        self.inner.read().tokens.get(strip_bearer(token)).cloned()
    }

    /// Current token of a user.
    pub fn lookup_by_user(&self, user_id: i64) -> Option<String> {
        self.inner.read().user_tokens.get(&user_id).cloned()
    }

    /// Remove a token. The user's reverse mapping is dropped only if it
    /// still points at this token.
    pub fn revoke(&self, token: &str) -> bool {
        let token = strip_bearer(token);
        let mut guard = self.inner.write();
        let Some(entry) = guard.tokens.remove(token) else {
            return false;
        };
        if guard.user_tokens.get(&entry.user_id).map(String::as_str) == Some(token) {
            guard.user_tokens.remove(&entry.user_id);
        }
        drop(guard);

        info!(user_id = entry.user_id, "Token revoked");
        true
    }

    pub fn len(&self) -> usize {
        self.inner.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tokens.is_empty()
    }
}
