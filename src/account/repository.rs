//! Account repository: row operations inside one open atomic unit.

use rust_decimal::Decimal;

use super::models::{Account, AccountPatch};
use super::store::AccountTx;
use crate::error::{AccountRef, LedgerError};
use crate::money;

pub struct AccountRepository<'t> {
    tx: &'t mut dyn AccountTx,
}

impl<'t> AccountRepository<'t> {
    pub fn new(tx: &'t mut dyn AccountTx) -> Self {
        Self { tx }
    }

    pub async fn get(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.tx
            .find_by_id(id, false)
            .await?
            .ok_or(LedgerError::NotFound(AccountRef::Id(id)))
    }

    pub async fn get_by_user(&mut self, user_id: i64) -> Result<Account, LedgerError> {
        self.tx
            .find_by_user(user_id)
            .await?
            .ok_or(LedgerError::NotFound(AccountRef::User(user_id)))
    }

    /// Read and lock a row until the unit ends.
    pub async fn get_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.tx
            .find_by_id(id, true)
            .await?
            .ok_or(LedgerError::NotFound(AccountRef::Id(id)))
    }

    pub async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<Account>, LedgerError> {
        self.tx.list(skip, limit).await
    }

    pub async fn exists(&mut self, id: i64) -> Result<bool, LedgerError> {
        Ok(self.tx.find_by_id(id, false).await?.is_some())
    }

    pub async fn exists_for_user(&mut self, user_id: i64) -> Result<bool, LedgerError> {
        Ok(self.tx.find_by_user(user_id).await?.is_some())
    }

    /// Create the user's account.
    ///
    /// # Errors
    /// * `Duplicate` - the user already owns an account (pre-check or unique index)
    /// * `InvalidAmount` - negative or out-of-range initial balance
    pub async fn create(
        &mut self,
        user_id: i64,
        initial_balance: Option<Decimal>,
    ) -> Result<Account, LedgerError> {
        if self.exists_for_user(user_id).await? {
            return Err(LedgerError::Duplicate { user_id });
        }
        let balance = money::validate_balance(initial_balance.unwrap_or(Decimal::ZERO))?;
        self.tx.insert(user_id, balance).await
    }

    /// Apply a partial update. An empty patch returns the row unchanged.
    pub async fn update(&mut self, id: i64, patch: AccountPatch) -> Result<Account, LedgerError> {
        let current = self.get_for_update(id).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        let balance = match patch.balance {
            Some(balance) => money::validate_balance(balance)?,
            None => current.balance,
        };
        self.set_balance(id, balance).await
    }

    pub async fn delete(&mut self, id: i64) -> Result<bool, LedgerError> {
        // lock first so an in-flight mutation of the row finishes before removal
        self.get_for_update(id).await?;
        self.tx.remove(id).await
    }

    /// Unconditional overwrite.
    pub async fn set_balance(&mut self, id: i64, balance: Decimal) -> Result<Account, LedgerError> {
        self.tx
            .write_balance(id, balance)
            .await?
            .ok_or(LedgerError::NotFound(AccountRef::Id(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::memory::MemoryAccountStore;
    use crate::account::store::AccountStore;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_defaults_and_duplicate() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut repo = AccountRepository::new(tx.as_mut());

        let account = repo.create(7, None).await.unwrap();
        assert_eq!(account.balance.to_string(), "0.00");
        assert!(repo.exists(account.id).await.unwrap());
        assert!(repo.exists_for_user(7).await.unwrap());

        let err = repo.create(7, Some(dec("10"))).await.unwrap_err();
        assert_eq!(err, LedgerError::Duplicate { user_id: 7 });
    }

    #[tokio::test]
    async fn test_create_rejects_negative_balance() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut repo = AccountRepository::new(tx.as_mut());

        let err = repo.create(7, Some(dec("-1.00"))).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        assert!(!repo.exists_for_user(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_found_variants() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut repo = AccountRepository::new(tx.as_mut());

        assert_eq!(
            repo.get(99).await.unwrap_err(),
            LedgerError::NotFound(AccountRef::Id(99))
        );
        assert_eq!(
            repo.get_by_user(3).await.unwrap_err(),
            LedgerError::NotFound(AccountRef::User(3))
        );
        assert_eq!(
            repo.delete(99).await.unwrap_err(),
            LedgerError::NotFound(AccountRef::Id(99))
        );
        assert_eq!(
            repo.set_balance(99, Decimal::ONE).await.unwrap_err(),
            LedgerError::NotFound(AccountRef::Id(99))
        );
    }

    #[tokio::test]
    async fn test_update_empty_patch_on_missing_row() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut repo = AccountRepository::new(tx.as_mut());

        assert_eq!(
            repo.update(42, AccountPatch::default()).await.unwrap_err(),
            LedgerError::NotFound(AccountRef::Id(42))
        );
    }

    #[tokio::test]
    async fn test_update_empty_patch_is_noop() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut repo = AccountRepository::new(tx.as_mut());

        let account = repo.create(7, Some(dec("12.50"))).await.unwrap();
        let same = repo.update(account.id, AccountPatch::default()).await.unwrap();
        assert_eq!(same, account);

        let updated = repo
            .update(
                account.id,
                AccountPatch {
                    balance: Some(dec("99")),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.balance.to_string(), "99.00");
    }
}
