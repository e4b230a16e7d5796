//! Token distribution event
//!
//! JSON payload published by the user service after a successful login:
//!
//! ```json
//! {"token": "...", "user_id": 7, "username": "alice",
//!  "token_type": "bearer", "expires_in": 1800.0,
//!  "issued_at": "2024-05-01T10:00:00", "action": "validate_token"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only action the ledger acts on. Events without an action are treated
/// the same way.
pub const VALIDATE_TOKEN_ACTION: &str = "validate_token";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Malformed token event: {0}")]
    Malformed(String),

    #[error("Token event is missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenEvent {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Seconds, advisory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<f64>,
    /// As sent by the issuer; not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl TokenEvent {
    /// Decode a payload and check the required fields.
    pub fn parse(payload: &[u8]) -> Result<Self, EventError> {
        let event: TokenEvent =
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// `token`, `user_id` and `username` must be present and non-empty.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.token.as_deref().is_none_or(str::is_empty) {
            return Err(EventError::MissingField("token"));
        }
        if self.user_id.is_none() {
            return Err(EventError::MissingField("user_id"));
        }
        if self.username.as_deref().is_none_or(str::is_empty) {
            return Err(EventError::MissingField("username"));
        }
        Ok(())
    }

    /// Whether the event asks the ledger to cache its token.
    pub fn is_token_validation(&self) -> bool {
        self.action
            .as_deref()
            .is_none_or(|action| action == VALIDATE_TOKEN_ACTION)
    }

    pub fn to_payload(&self) -> Result<String, EventError> {
        serde_json::to_string(self).map_err(|e| EventError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_event() {
        let payload = br#"{"token":"abc","user_id":7,"username":"alice",
            "token_type":"bearer","expires_in":1800.0,
            "issued_at":"2024-05-01T10:00:00","service":"user-service",
            "action":"validate_token"}"#;
        let event = TokenEvent::parse(payload).unwrap();
        assert_eq!(event.token.as_deref(), Some("abc"));
        assert_eq!(event.user_id, Some(7));
        assert_eq!(event.expires_in, Some(1800.0));
        assert!(event.is_token_validation());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            TokenEvent::parse(b"not json"),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert_eq!(
            TokenEvent::parse(br#"{"user_id":7,"username":"alice"}"#),
            Err(EventError::MissingField("token"))
        );
        assert_eq!(
            TokenEvent::parse(br#"{"token":"abc","username":"alice"}"#),
            Err(EventError::MissingField("user_id"))
        );
        assert_eq!(
            TokenEvent::parse(br#"{"token":"abc","user_id":7,"username":""}"#),
            Err(EventError::MissingField("username"))
        );
    }

    #[test]
    fn test_action_filter() {
        let mut event = TokenEvent {
            token: Some("abc".into()),
            user_id: Some(7),
            username: Some("alice".into()),
            ..Default::default()
        };
        assert!(event.is_token_validation());
        event.action = Some("user_login".into());
        assert!(!event.is_token_validation());
    }

    #[test]
    fn test_payload_omits_absent_optionals() {
        let event = TokenEvent {
            token: Some("abc".into()),
            user_id: Some(7),
            username: Some("alice".into()),
            ..Default::default()
        };
        let payload = event.to_payload().unwrap();
        assert!(!payload.contains("expires_in"));
        assert_eq!(TokenEvent::parse(payload.as_bytes()).unwrap(), event);
    }
}
