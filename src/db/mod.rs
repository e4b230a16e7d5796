//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// `accounts` table, one row per user.
const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    user_id     BIGINT NOT NULL,
    balance     NUMERIC(12, 2) NOT NULL DEFAULT 0.00 CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#;

const CREATE_ACCOUNTS_USER_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_accounts_user_id ON accounts (user_id)";

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(50)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the `accounts` table and its unique user index if missing.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_ACCOUNTS).execute(&self.pool).await?;
        sqlx::query(CREATE_ACCOUNTS_USER_INDEX)
            .execute(&self.pool)
            .await?;
        tracing::info!("Schema ready: accounts");
        Ok(())
    }
}
