//! Ledger Error Types
//!
//! One error taxonomy for the whole request path. The repository raises the
//! specific kinds, the service propagates them unchanged (after rolling back),
//! and the gateway renders them through [`IntoResponse`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// How an account was addressed when it could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRef {
    Id(i64),
    User(i64),
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "Account with id {} not found", id),
            AccountRef::User(user_id) => write!(f, "Account for user {} not found", user_id),
        }
    }
}

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // === Lookup Errors ===
    #[error("{0}")]
    NotFound(AccountRef),

    #[error("Account for user {user_id} already exists")]
    Duplicate { user_id: i64 },

    // === Money Errors ===
    #[error("Invalid amount: {amount}. {reason}")]
    InvalidAmount { amount: Decimal, reason: &'static str },

    #[error(
        "Insufficient balance in account {account_id}. Current: {current}, Required: {required}"
    )]
    InsufficientBalance {
        account_id: i64,
        current: Decimal,
        required: Decimal,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Auth Errors ===
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    // === System Errors ===
    #[error("Operation timed out and was rolled back")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn not_positive(amount: Decimal) -> Self {
        LedgerError::InvalidAmount {
            amount,
            reason: "Amount must be positive",
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        LedgerError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        LedgerError::Forbidden(msg.into())
    }

    /// Get the error code name for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::Duplicate { .. } => "DUPLICATE_ACCOUNT",
            LedgerError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::InvalidRequest(_) => "INVALID_REQUEST",
            LedgerError::Unauthorized(_) => "UNAUTHORIZED",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::Timeout => "TIMEOUT",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Numeric code carried in the error body.
    pub fn numeric_code(&self) -> i32 {
        match self {
            LedgerError::InvalidAmount { .. } => 1001,
            LedgerError::InsufficientBalance { .. } => 1002,
            LedgerError::InvalidRequest(_) => 1003,
            LedgerError::Unauthorized(_) => 2001,
            LedgerError::Forbidden(_) => 2003,
            LedgerError::NotFound(_) => 4004,
            LedgerError::Duplicate { .. } => 4009,
            LedgerError::Internal(_) => 5000,
            LedgerError::Timeout => 5003,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Duplicate { .. } => StatusCode::CONFLICT,
            LedgerError::InvalidAmount { .. } | LedgerError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
            LedgerError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Internal(format!("Database error: {}", e))
    }
}

/// JSON response body for ledger errors.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: i32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.numeric_code(),
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::NotFound(AccountRef::Id(1)).code(),
            "ACCOUNT_NOT_FOUND"
        );
        assert_eq!(
            LedgerError::Duplicate { user_id: 7 }.code(),
            "DUPLICATE_ACCOUNT"
        );
        assert_eq!(LedgerError::unauthorized("x").code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            LedgerError::NotFound(AccountRef::User(3)).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LedgerError::Duplicate { user_id: 7 }.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LedgerError::not_positive(Decimal::ZERO).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::InsufficientBalance {
                account_id: 1,
                current: dec("10.00"),
                required: dec("20.00"),
            }
            .http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LedgerError::unauthorized("no token").http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            LedgerError::forbidden("not yours").http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            LedgerError::Internal("boom".into()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LedgerError::NotFound(AccountRef::Id(42)).to_string(),
            "Account with id 42 not found"
        );
        assert_eq!(
            LedgerError::NotFound(AccountRef::User(7)).to_string(),
            "Account for user 7 not found"
        );
        let err = LedgerError::InsufficientBalance {
            account_id: 1,
            current: dec("1050.00"),
            required: dec("2000.00"),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance in account 1. Current: 1050.00, Required: 2000.00"
        );
    }
}
