//! Account ledger
//!
//! Per-user balances behind a transactional store, with deposit, withdraw and
//! transfer executed as single atomic units.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod store;

pub use memory::MemoryAccountStore;
pub use models::{Account, AccountPatch, TransferOutcome};
pub use postgres::PgAccountStore;
pub use repository::AccountRepository;
pub use service::{AccountService, DEFAULT_OP_TIMEOUT};
pub use store::{AccountStore, AccountTx};
