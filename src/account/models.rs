//! Data models for account management

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One row of the `accounts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Account {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = 7)]
    pub user_id: i64,
    #[schema(value_type = String, example = "1050.00")]
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AccountPatch {
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "250.00")]
    pub balance: Option<Decimal>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.balance.is_none()
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferOutcome {
    pub from_account: Account,
    pub to_account: Account,
    #[schema(value_type = String, example = "500.00")]
    pub amount: Decimal,
    pub success: bool,
    pub message: String,
}
