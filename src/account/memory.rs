//! In-process ledger store
//!
//! Used when no PostgreSQL URL is configured and by the test suites. A unit
//! holds the store mutex for its whole lifetime and works on a staged copy of
//! the rows, so units are fully serialized and an abandoned unit leaves no
//! trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::Account;
use super::store::{AccountStore, AccountTx};
use crate::error::LedgerError;

#[derive(Debug, Clone, Default)]
struct Rows {
    last_id: i64,
    by_id: BTreeMap<i64, Account>,
}

#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    rows: Arc<Mutex<Rows>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn AccountTx>, LedgerError> {
        let guard = self.rows.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryAccountTx { guard, staged }))
    }
}

struct MemoryAccountTx {
    guard: OwnedMutexGuard<Rows>,
    staged: Rows,
}

#[async_trait]
impl AccountTx for MemoryAccountTx {
    async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<Account>, LedgerError> {
        Ok(self
            .staged
            .by_id
            .values()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_by_id(&mut self, id: i64, _lock: bool) -> Result<Option<Account>, LedgerError> {
        Ok(self.staged.by_id.get(&id).cloned())
    }

    async fn find_by_user(&mut self, user_id: i64) -> Result<Option<Account>, LedgerError> {
        Ok(self
            .staged
            .by_id
            .values()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn insert(&mut self, user_id: i64, balance: Decimal) -> Result<Account, LedgerError> {
        if self.staged.by_id.values().any(|a| a.user_id == user_id) {
            return Err(LedgerError::Duplicate { user_id });
        }
        self.staged.last_id += 1;
        let account = Account {
            id: self.staged.last_id,
            user_id,
            balance,
            created_at: Utc::now(),
        };
        self.staged.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    async fn write_balance(
        &mut self,
        id: i64,
        balance: Decimal,
    ) -> Result<Option<Account>, LedgerError> {
        Ok(self.staged.by_id.get_mut(&id).map(|account| {
            account.balance = balance;
            account.clone()
        }))
    }

    async fn remove(&mut self, id: i64) -> Result<bool, LedgerError> {
        Ok(self.staged.by_id.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let MemoryAccountTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        Ok(())
    }
}
