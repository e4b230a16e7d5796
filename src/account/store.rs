//! Ledger Store seam
//!
//! The ledger relies on an external transactional store. Everything the
//! repository needs from it is expressed here: open an atomic unit, run row
//! reads/writes inside it, then commit or roll back.
//!
//! # Safety Invariants
//!
//! 1. **All-or-nothing**: writes made through an [`AccountTx`] become visible
//!    only on [`AccountTx::commit`]. Dropping a unit without committing must
//!    discard them.
//! 2. **Row locks**: `find_by_id(.., lock = true)` holds the row until the unit
//!    ends, so concurrent mutations of one account serialize.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::Account;
use crate::error::LedgerError;

/// Factory for atomic units.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a new atomic unit
    async fn begin(&self) -> Result<Box<dyn AccountTx>, LedgerError>;
}

/// Row-level primitives inside one atomic unit.
///
/// Methods return `Option`/`bool` for absence; turning absence into
/// `NotFound` is the repository's job.
#[async_trait]
pub trait AccountTx: Send {
    async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<Account>, LedgerError>;

    /// Read one row; with `lock` the row stays locked until commit/rollback.
    async fn find_by_id(&mut self, id: i64, lock: bool) -> Result<Option<Account>, LedgerError>;

    async fn find_by_user(&mut self, user_id: i64) -> Result<Option<Account>, LedgerError>;

    /// Insert a row. A uniqueness violation on `user_id` is reported as `Duplicate`.
    async fn insert(&mut self, user_id: i64, balance: Decimal) -> Result<Account, LedgerError>;

    /// Overwrite the balance, returning the new row or `None` if it is gone.
    async fn write_balance(
        &mut self,
        id: i64,
        balance: Decimal,
    ) -> Result<Option<Account>, LedgerError>;

    /// Delete a row, returning whether one was removed.
    async fn remove(&mut self, id: i64) -> Result<bool, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}
