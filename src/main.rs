//! Account Ledger service
//!
//! ```text
//! ┌──────────────┐  token events  ┌──────────────┐
//! │ user service │───────────────▶│ TokenConsumer│──┐
//! └──────────────┘  (Redis stream)└──────────────┘  │ store
//!                                                   ▼
//! ┌──────────────┐  Bearer token  ┌──────────────┐ ┌────────────┐
//! │    client    │───────────────▶│   gateway    │▶│ TokenCache │
//! └──────────────┘                └──────┬───────┘ └────────────┘
//!                                        ▼
//!                                 ┌──────────────┐
//!                                 │AccountService│──▶ PostgreSQL
//!                                 └──────────────┘
//! ```
//!
//! Usage: `account_ledger [--env dev] [--port 8000]`

use std::sync::Arc;

use anyhow::Context;

use account_ledger::account::{AccountService, AccountStore, MemoryAccountStore, PgAccountStore};
use account_ledger::auth::{AuthChain, TokenCache, TokenValidator};
use account_ledger::config::AppConfig;
use account_ledger::db::Database;
use account_ledger::gateway::{self, AppState};
use account_ledger::logging::init_logging;
use account_ledger::messaging::{RedisStreamsBroker, TokenConsumer};

fn get_arg(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn get_env() -> String {
    get_arg("--env")
        .or_else(|| get_arg("-e"))
        .unwrap_or_else(|| "dev".to_string())
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    get_arg("--port").and_then(|p| p.parse().ok())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("Failed to load configuration")?;
    let _log_guard = init_logging(&app_config);

    tracing::info!("Starting Account Ledger in {} mode", env);

    // Ledger store
    let (store, db): (Arc<dyn AccountStore>, Option<Arc<Database>>) =
        match app_config.postgres_url.as_deref() {
            Some(url) => {
                let db = Database::connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                db.ensure_schema()
                    .await
                    .context("Failed to initialize ledger schema")?;
                tracing::info!("[DB] PostgreSQL connected, schema ready");
                let db = Arc::new(db);
                (Arc::new(PgAccountStore::new(db.pool().clone())), Some(db))
            }
            None => {
                tracing::warn!("[DB] postgres_url not set, balances are kept in memory only");
                (Arc::new(MemoryAccountStore::new()), None)
            }
        };
    let accounts = Arc::new(AccountService::new(
        store,
        app_config.ledger.op_timeout(),
    ));

    // Authentication
    let tokens = Arc::new(TokenCache::new());
    let validator = TokenValidator::new(&app_config.auth.jwt_secret, &app_config.auth.algorithm)
        .context("Invalid auth configuration")?;
    let auth = Arc::new(AuthChain::standard(tokens.clone(), validator));

    let mut state = AppState::new(accounts, auth, tokens.clone());
    if let Some(db) = db {
        state = state.with_database(db);
    }

    // Token channel
    let consumer = if app_config.broker.enabled {
        let broker = RedisStreamsBroker::new(&app_config.broker.url, app_config.broker.topology())
            .context("Invalid broker configuration")?;
        let handle = TokenConsumer::start(
            broker,
            tokens.clone(),
            app_config.broker.consumer_config(),
        );
        state = state.with_consumer_state(handle.subscribe());
        Some(handle)
    } else {
        tracing::warn!("[BROKER] Token consumer disabled, only JWT authentication is available");
        None
    };
    let stopper = consumer.as_ref().map(|c| c.stopper());
    let consumer_done = async move {
        match consumer {
            Some(handle) => handle.join().await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(consumer_done);

    let port = get_port_override().unwrap_or(app_config.server.port);
    let app = gateway::build_router(Arc::new(state));
    let server = gateway::run_server(&app_config.server.host, port, app, shutdown_signal());
    tokio::pin!(server);

    tokio::select! {
        served = &mut server => {
            if let Some(stopper) = stopper {
                stopper.stop();
                if let Err(e) = consumer_done.await {
                    tracing::warn!(error = %e, "[BROKER] Consumer ended with error");
                }
            }
            served.context("Server error")?;
        }
        joined = &mut consumer_done => {
            // The consumer only finishes on its own when startup failed
            joined.context("Token consumer failed")?;
            server.await.context("Server error")?;
        }
    }

    tracing::info!("Account Ledger stopped");
    Ok(())
}
