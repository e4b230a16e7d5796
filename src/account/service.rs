//! Account Service
//!
//! Business operations over the ledger. Every public method runs inside
//! exactly one atomic unit of the injected [`AccountStore`]:
//!
//! 1. `begin` a unit
//! 2. run the operation through an [`AccountRepository`]
//! 3. `commit` on success, otherwise `rollback` and return the original error
//!
//! Balance mutations read their rows with `get_for_update`, so concurrent
//! mutations of the same account serialize at the store. Transfers lock both
//! rows in ascending id order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::models::{Account, AccountPatch, TransferOutcome};
use super::repository::AccountRepository;
use super::store::{AccountStore, AccountTx};
use crate::error::LedgerError;
use crate::money;

/// Default bound on one atomic unit
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

type UnitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    op_timeout: Duration,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Run `op` inside one atomic unit bounded by the operation timeout.
    async fn atomically<T, F>(&self, name: &'static str, op: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut dyn AccountTx) -> UnitFuture<'a, T> + Send,
    {
        let mut tx = tokio::time::timeout(self.op_timeout, self.store.begin())
            .await
            .map_err(|_| LedgerError::Timeout)??;

        let result = match tokio::time::timeout(self.op_timeout, op(tx.as_mut())).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout),
        };

        match result {
            Ok(value) => {
                tx.commit().await?;
                debug!(op = name, "Unit committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(op = name, error = %rollback_err, "Rollback failed");
                }
                debug!(op = name, error = %err, "Unit rolled back");
                Err(err)
            }
        }
    }

    pub async fn list_accounts(&self, skip: i64, limit: i64) -> Result<Vec<Account>, LedgerError> {
        self.atomically("list_accounts", move |tx| {
            Box::pin(async move { AccountRepository::new(tx).list(skip, limit).await })
        })
        .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Account, LedgerError> {
        self.atomically("get_by_id", move |tx| {
            Box::pin(async move { AccountRepository::new(tx).get(id).await })
        })
        .await
    }

    pub async fn get_by_user(&self, user_id: i64) -> Result<Account, LedgerError> {
        self.atomically("get_by_user", move |tx| {
            Box::pin(async move { AccountRepository::new(tx).get_by_user(user_id).await })
        })
        .await
    }

    pub async fn create_account(
        &self,
        user_id: i64,
        balance: Option<Decimal>,
    ) -> Result<Account, LedgerError> {
        let account = self
            .atomically("create_account", move |tx| {
                Box::pin(async move { AccountRepository::new(tx).create(user_id, balance).await })
            })
            .await?;
        info!(account_id = account.id, user_id, balance = %account.balance, "Account created");
        Ok(account)
    }

    pub async fn update_account(
        &self,
        id: i64,
        patch: AccountPatch,
    ) -> Result<Account, LedgerError> {
        self.atomically("update_account", move |tx| {
            Box::pin(async move { AccountRepository::new(tx).update(id, patch).await })
        })
        .await
    }

    pub async fn delete_account(&self, id: i64) -> Result<bool, LedgerError> {
        let removed = self
            .atomically("delete_account", move |tx| {
                Box::pin(async move { AccountRepository::new(tx).delete(id).await })
            })
            .await?;
        info!(account_id = id, "Account deleted");
        Ok(removed)
    }

    /// Add `amount` to the account balance.
    ///
    /// # Errors
    /// * `InvalidAmount` - amount not positive, too precise, or result out of range
    /// * `NotFound` - no such account
    pub async fn deposit(&self, id: i64, amount: Decimal) -> Result<Account, LedgerError> {
        let amount = money::validate_amount(amount)?;
        let account = self
            .atomically("deposit", move |tx| {
                Box::pin(async move {
                    let mut repo = AccountRepository::new(tx);
                    let current = repo.get_for_update(id).await?;
                    let balance = money::credit(id, current.balance, amount)?;
                    repo.set_balance(id, balance).await
                })
            })
            .await?;
        info!(account_id = id, %amount, balance = %account.balance, "Deposit applied");
        Ok(account)
    }

    /// Subtract `amount` from the account balance.
    ///
    /// # Errors
    /// * `InvalidAmount` - amount not positive or too precise
    /// * `NotFound` - no such account
    /// * `InsufficientBalance` - balance below `amount`; nothing is written
    pub async fn withdraw(&self, id: i64, amount: Decimal) -> Result<Account, LedgerError> {
        let amount = money::validate_amount(amount)?;
        let account = self
            .atomically("withdraw", move |tx| {
                Box::pin(async move {
                    let mut repo = AccountRepository::new(tx);
                    let current = repo.get_for_update(id).await?;
                    let balance = money::debit(id, current.balance, amount)?;
                    repo.set_balance(id, balance).await
                })
            })
            .await?;
        info!(account_id = id, %amount, balance = %account.balance, "Withdrawal applied");
        Ok(account)
    }

    /// Move `amount` from `from_id` to `to_id` in one unit.
    ///
    /// A self-transfer takes one lock, checks sufficiency against the current
    /// balance and leaves it unchanged.
    pub async fn transfer(
        &self,
        from_id: i64,
        to_id: i64,
        amount: Decimal,
    ) -> Result<TransferOutcome, LedgerError> {
        let amount = money::validate_amount(amount)?;
        let outcome = self
            .atomically("transfer", move |tx| {
                Box::pin(async move {
                    let mut repo = AccountRepository::new(tx);

                    if from_id == to_id {
                        let account = repo.get_for_update(from_id).await?;
                        money::debit(from_id, account.balance, amount)?;
                        return Ok(TransferOutcome {
                            from_account: account.clone(),
                            to_account: account,
                            amount,
                            success: true,
                            message: "Transfer completed successfully".to_string(),
                        });
                    }

                    // Lock order: ascending id
                    let (low, high) = (from_id.min(to_id), from_id.max(to_id));
                    let first = repo.get_for_update(low).await?;
                    let second = repo.get_for_update(high).await?;
                    let (source, dest) = if low == from_id {
                        (first, second)
                    } else {
                        (second, first)
                    };

                    let source_balance = money::debit(from_id, source.balance, amount)?;
                    let dest_balance = money::credit(to_id, dest.balance, amount)?;

                    let from_account = repo.set_balance(from_id, source_balance).await?;
                    let to_account = repo.set_balance(to_id, dest_balance).await?;

                    Ok(TransferOutcome {
                        from_account,
                        to_account,
                        amount,
                        success: true,
                        message: "Transfer completed successfully".to_string(),
                    })
                })
            })
            .await?;
        info!(from_id, to_id, %amount, "Transfer applied");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::memory::MemoryAccountStore;
    use crate::error::AccountRef;
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn service() -> AccountService {
        AccountService::new(Arc::new(MemoryAccountStore::new()), DEFAULT_OP_TIMEOUT)
    }

    async fn seeded(service: &AccountService, user_id: i64, balance: &str) -> Account {
        service
            .create_account(user_id, Some(dec(balance)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_deposit() {
        let service = service();
        let account = seeded(&service, 1, "1000.00").await;

        let updated = service.deposit(account.id, dec("50.00")).await.unwrap();
        assert_eq!(updated.balance.to_string(), "1050.00");
        assert_eq!(
            service.get_by_id(account.id).await.unwrap().balance,
            dec("1050.00")
        );
    }

    #[tokio::test]
    async fn test_deposit_rejects_non_positive() {
        let service = service();
        let account = seeded(&service, 1, "10.00").await;

        for amount in ["0", "-5.00"] {
            let err = service.deposit(account.id, dec(amount)).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        }
        assert_eq!(
            service.get_by_id(account.id).await.unwrap().balance,
            dec("10.00")
        );
    }

    #[tokio::test]
    async fn test_deposit_missing_account() {
        let service = service();
        let err = service.deposit(404, dec("1.00")).await.unwrap_err();
        assert_eq!(err, LedgerError::NotFound(AccountRef::Id(404)));
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_leaves_balance() {
        let service = service();
        let account = seeded(&service, 1, "1050.00").await;

        let err = service
            .withdraw(account.id, dec("2000.00"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account_id: account.id,
                current: dec("1050.00"),
                required: dec("2000.00"),
            }
        );
        assert_eq!(
            service.get_by_id(account.id).await.unwrap().balance,
            dec("1050.00")
        );
    }

    #[tokio::test]
    async fn test_withdraw_to_zero() {
        let service = service();
        let account = seeded(&service, 1, "25.50").await;
        let updated = service.withdraw(account.id, dec("25.50")).await.unwrap();
        assert_eq!(updated.balance.to_string(), "0.00");
    }

    #[tokio::test]
    async fn test_transfer() {
        let service = service();
        let a = seeded(&service, 1, "1050.00").await;
        let b = seeded(&service, 2, "200.00").await;

        let outcome = service.transfer(a.id, b.id, dec("500.00")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.amount, dec("500.00"));
        assert_eq!(outcome.from_account.balance.to_string(), "550.00");
        assert_eq!(outcome.to_account.balance.to_string(), "700.00");
    }

    #[tokio::test]
    async fn test_transfer_descending_ids() {
        let service = service();
        let a = seeded(&service, 1, "10.00").await;
        let b = seeded(&service, 2, "90.00").await;

        let outcome = service.transfer(b.id, a.id, dec("40.00")).await.unwrap();
        assert_eq!(outcome.from_account.id, b.id);
        assert_eq!(outcome.from_account.balance, dec("50.00"));
        assert_eq!(outcome.to_account.balance, dec("50.00"));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_references_source() {
        let service = service();
        let a = seeded(&service, 1, "10.00").await;
        let b = seeded(&service, 2, "0.00").await;

        let err = service.transfer(a.id, b.id, dec("10.01")).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { account_id, .. } if account_id == a.id
        ));
        assert_eq!(service.get_by_id(a.id).await.unwrap().balance, dec("10.00"));
        assert_eq!(service.get_by_id(b.id).await.unwrap().balance, dec("0.00"));
    }

    #[tokio::test]
    async fn test_transfer_missing_destination_changes_nothing() {
        let service = service();
        let a = seeded(&service, 1, "10.00").await;

        let err = service.transfer(a.id, 999, dec("5.00")).await.unwrap_err();
        assert_eq!(err, LedgerError::NotFound(AccountRef::Id(999)));
        assert_eq!(service.get_by_id(a.id).await.unwrap().balance, dec("10.00"));
    }

    #[tokio::test]
    async fn test_transfer_to_self() {
        let service = service();
        let a = seeded(&service, 1, "100.00").await;

        let outcome = service.transfer(a.id, a.id, dec("60.00")).await.unwrap();
        assert_eq!(outcome.from_account.balance, dec("100.00"));
        assert_eq!(outcome.to_account.balance, dec("100.00"));

        let err = service.transfer(a.id, a.id, dec("100.01")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let service = service();
        service.create_account(7, None).await.unwrap();
        let err = service.create_account(7, None).await.unwrap_err();
        assert_eq!(err, LedgerError::Duplicate { user_id: 7 });
        assert_eq!(service.list_accounts(0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let service = service();
        let account = seeded(&service, 3, "1.00").await;

        let same = service
            .update_account(account.id, AccountPatch::default())
            .await
            .unwrap();
        assert_eq!(same.balance, dec("1.00"));

        assert!(service.delete_account(account.id).await.unwrap());
        assert_eq!(
            service.get_by_user(3).await.unwrap_err(),
            LedgerError::NotFound(AccountRef::User(3))
        );
        assert!(matches!(
            service.delete_account(account.id).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_deposits_and_withdrawals() {
        let service = Arc::new(service());
        let account = seeded(&service, 1, "100.00").await;

        let mut handles = vec![];
        for i in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    service.deposit(account.id, dec("10.00")).await
                } else {
                    service.withdraw(account.id, dec("5.00")).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // 100 + 10*10 - 10*5
        assert_eq!(
            service.get_by_id(account.id).await.unwrap().balance,
            dec("150.00")
        );
    }

    #[tokio::test]
    async fn test_concurrent_transfers_conserve_total() {
        let service = Arc::new(service());
        let a = seeded(&service, 1, "500.00").await;
        let b = seeded(&service, 2, "500.00").await;

        let mut handles = vec![];
        for i in 0..10 {
            let service = service.clone();
            let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
            handles.push(tokio::spawn(async move {
                service.transfer(from, to, dec("75.25")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let total = service.get_by_id(a.id).await.unwrap().balance
            + service.get_by_id(b.id).await.unwrap().balance;
        assert_eq!(total, dec("1000.00"));
    }

    /// Store wrapper that counts commits/rollbacks and can stall units.
    struct CountingStore {
        inner: MemoryAccountStore,
        commits: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
        stall: Option<Duration>,
    }

    struct CountingTx {
        inner: Box<dyn AccountTx>,
        commits: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
        stall: Option<Duration>,
    }

    #[async_trait]
    impl AccountStore for CountingStore {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn begin(&self) -> Result<Box<dyn AccountTx>, LedgerError> {
            Ok(Box::new(CountingTx {
                inner: self.inner.begin().await?,
                commits: self.commits.clone(),
                rollbacks: self.rollbacks.clone(),
                stall: self.stall,
            }))
        }
    }

    #[async_trait]
    impl AccountTx for CountingTx {
        async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<Account>, LedgerError> {
            self.inner.list(skip, limit).await
        }

        async fn find_by_id(
            &mut self,
            id: i64,
            lock: bool,
        ) -> Result<Option<Account>, LedgerError> {
            self.inner.find_by_id(id, lock).await
        }

        async fn find_by_user(&mut self, user_id: i64) -> Result<Option<Account>, LedgerError> {
            self.inner.find_by_user(user_id).await
        }

        async fn insert(&mut self, user_id: i64, balance: Decimal) -> Result<Account, LedgerError> {
            self.inner.insert(user_id, balance).await
        }

        async fn write_balance(
            &mut self,
            id: i64,
            balance: Decimal,
        ) -> Result<Option<Account>, LedgerError> {
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            self.inner.write_balance(id, balance).await
        }

        async fn remove(&mut self, id: i64) -> Result<bool, LedgerError> {
            self.inner.remove(id).await
        }

        async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback().await
        }
    }

    fn counting(stall: Option<Duration>) -> (AccountService, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner: MemoryAccountStore::new(),
            commits: commits.clone(),
            rollbacks: rollbacks.clone(),
            stall,
        };
        (
            AccountService::new(Arc::new(store), Duration::from_millis(50)),
            commits,
            rollbacks,
        )
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_returns_original_error() {
        let (service, commits, rollbacks) = counting(None);
        let account = service.create_account(1, Some(dec("5.00"))).await.unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 1);

        let err = service.withdraw(account.id, dec("6.00")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let (service, _commits, rollbacks) = counting(Some(Duration::from_millis(200)));
        let account = service.create_account(1, Some(dec("5.00"))).await.unwrap();

        let err = service.deposit(account.id, dec("1.00")).await.unwrap_err();
        assert_eq!(err, LedgerError::Timeout);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(
            service.get_by_id(account.id).await.unwrap().balance,
            dec("5.00")
        );
    }
}
