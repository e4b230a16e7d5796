use std::sync::Arc;

use tokio::sync::watch;

use crate::account::AccountService;
use crate::auth::{AuthChain, TokenCache};
use crate::db::Database;
use crate::messaging::ConsumerState;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub auth: Arc<AuthChain>,
    /// Same cache the token consumer writes to
    pub tokens: Arc<TokenCache>,
    /// Present when running on PostgreSQL
    pub db: Option<Arc<Database>>,
    /// Present when the token consumer runs
    pub consumer_state: Option<watch::Receiver<ConsumerState>>,
}

impl AppState {
    pub fn new(accounts: Arc<AccountService>, auth: Arc<AuthChain>, tokens: Arc<TokenCache>) -> Self {
        Self {
            accounts,
            auth,
            tokens,
            db: None,
            consumer_state: None,
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_consumer_state(mut self, state: watch::Receiver<ConsumerState>) -> Self {
        self.consumer_state = Some(state);
        self
    }
}
