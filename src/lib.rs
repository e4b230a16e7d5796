//! Account Ledger - per-user balances over HTTP
//!
//! # Modules
//!
//! - [`money`] - Fixed-scale amounts and balance arithmetic
//! - [`account`] - Store seam, repository and the transactional service
//! - [`db`] - PostgreSQL pool and schema
//! - [`auth`] - Token cache, JWT validation and the bearer middleware
//! - [`messaging`] - Token channel consumer and broker adapters
//! - [`gateway`] - axum router, handlers and OpenAPI docs
//! - [`config`] - YAML config with environment overrides
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - Error taxonomy and HTTP mapping

pub mod account;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod messaging;
pub mod money;

// Convenient re-exports at crate root
pub use account::{
    Account, AccountPatch, AccountService, AccountStore, MemoryAccountStore, PgAccountStore,
    TransferOutcome,
};
pub use auth::{AuthChain, AuthenticatedUser, TokenCache, TokenValidator};
pub use config::AppConfig;
pub use error::{ErrorResponse, LedgerError};
pub use gateway::{AppState, build_router};
pub use messaging::{TokenConsumer, TokenEvent};
