//! PostgreSQL ledger store
//!
//! Each atomic unit is one `sqlx` transaction. Locking reads use
//! `SELECT ... FOR UPDATE`, so two units touching the same account queue on
//! the row lock instead of interleaving.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::Account;
use super::store::{AccountStore, AccountTx};
use crate::error::LedgerError;

/// `AccountStore` backed by the `accounts` table.
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn AccountTx>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgAccountTx { tx }))
    }
}

struct PgAccountTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountTx for PgAccountTx {
    async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, Account>(
            r#"SELECT id, user_id, balance, created_at
               FROM accounts ORDER BY id OFFSET $1 LIMIT $2"#,
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn find_by_id(&mut self, id: i64, lock: bool) -> Result<Option<Account>, LedgerError> {
        let sql = if lock {
            "SELECT id, user_id, balance, created_at FROM accounts WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, user_id, balance, created_at FROM accounts WHERE id = $1"
        };

        let row = sqlx::query_as::<_, Account>(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row)
    }

    async fn find_by_user(&mut self, user_id: i64) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, Account>(
            "SELECT id, user_id, balance, created_at FROM accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn insert(&mut self, user_id: i64, balance: Decimal) -> Result<Account, LedgerError> {
        let result = sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts (user_id, balance) VALUES ($1, $2)
               RETURNING id, user_id, balance, created_at"#,
        )
        .bind(user_id)
        .bind(balance)
        .fetch_one(&mut *self.tx)
        .await;

        match result {
            Ok(account) => Ok(account),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(LedgerError::Duplicate { user_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_balance(
        &mut self,
        id: i64,
        balance: Decimal,
    ) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, Account>(
            r#"UPDATE accounts SET balance = $2 WHERE id = $1
               RETURNING id, user_id, balance, created_at"#,
        )
        .bind(id)
        .bind(balance)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn remove(&mut self, id: i64) -> Result<bool, LedgerError> {
        let res = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
