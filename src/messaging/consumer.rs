//! Token Consumer
//!
//! Background task that drains the token distribution channel into the
//! [`TokenCache`].
//!
//! ```text
//! Disconnected -> Connecting -> Consuming --(connection lost)--> Reconnecting
//!                     ^                                               |
//!                     +-----------------------------------------------+
//! any state --stop()--> Stopped
//! ```
//!
//! Startup connection attempts are bounded; running out of them ends the task
//! with [`ConsumerError::ConnectFailed`], visible through
//! [`ConsumerHandle::join`]. Once connected, reconnects retry until stopped.
//!
//! Every delivery is acknowledged exactly once it has been handled. Entries
//! that cannot be parsed, or lack `token`/`user_id`/`username`, are copied to
//! the dead-letter channel first and never requeued.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broker::{BrokerError, Delivery, TokenBroker};
use super::event::TokenEvent;
use crate::auth::token_cache::TokenCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Consuming,
    Reconnecting,
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsumerState::Disconnected => "disconnected",
            ConsumerState::Connecting => "connecting",
            ConsumerState::Consuming => "consuming",
            ConsumerState::Reconnecting => "reconnecting",
            ConsumerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    #[error("Failed to connect to broker after {attempts} attempts: {last_error}")]
    ConnectFailed { attempts: u32, last_error: String },

    #[error("Consumer task failed: {0}")]
    Task(String),
}

/// Configuration for the token consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Entries with any other routing key are acknowledged and skipped
    pub routing_key: String,
    /// Maximum entries per read
    pub batch_size: usize,
    /// How long one read waits for new entries
    pub block: Duration,
    /// Connection attempts before startup gives up
    pub startup_attempts: u32,
    /// First retry delay; doubles on every failure
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            routing_key: "auth.token".to_string(),
            batch_size: 10,
            block: Duration::from_secs(1),
            startup_attempts: 5,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Stops a running consumer. Cloneable, independent of the join side.
#[derive(Clone)]
pub struct ConsumerStopper {
    stop: Arc<watch::Sender<bool>>,
}

impl ConsumerStopper {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

/// Handle to a started consumer. Dropping it stops the consumer.
pub struct ConsumerHandle {
    state: watch::Receiver<ConsumerState>,
    stopper: ConsumerStopper,
    task: JoinHandle<Result<(), ConsumerError>>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Receiver that follows state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    pub fn stopper(&self) -> ConsumerStopper {
        self.stopper.clone()
    }

    pub fn stop(&self) {
        self.stopper.stop();
    }

    /// Wait for the task to end. `Ok` after a requested stop, the fatal error otherwise.
    pub async fn join(self) -> Result<(), ConsumerError> {
        self.task
            .await
            .map_err(|e| ConsumerError::Task(e.to_string()))?
    }
}

pub struct TokenConsumer<B> {
    broker: B,
    cache: Arc<TokenCache>,
    config: ConsumerConfig,
    state: watch::Sender<ConsumerState>,
    stop: watch::Receiver<bool>,
}

impl<B: TokenBroker + 'static> TokenConsumer<B> {
    /// Spawn the consumer on the current runtime.
    pub fn start(broker: B, cache: Arc<TokenCache>, config: ConsumerConfig) -> ConsumerHandle {
        let (state_tx, state_rx) = watch::channel(ConsumerState::Disconnected);
        let (stop_tx, stop_rx) = watch::channel(false);

        let consumer = TokenConsumer {
            broker,
            cache,
            config,
            state: state_tx,
            stop: stop_rx,
        };
        let task = tokio::spawn(consumer.run());

        ConsumerHandle {
            state: state_rx,
            stopper: ConsumerStopper {
                stop: Arc::new(stop_tx),
            },
            task,
        }
    }

    async fn run(mut self) -> Result<(), ConsumerError> {
        info!(
            routing_key = %self.config.routing_key,
            startup_attempts = self.config.startup_attempts,
            "Starting token consumer"
        );
        let result = self.run_until_stopped().await;
        self.set_state(ConsumerState::Stopped);

        match &result {
            Ok(()) => info!("Token consumer stopped"),
            Err(e) => error!(error = %e, "Token consumer terminated"),
        }
        result
    }

    async fn run_until_stopped(&mut self) -> Result<(), ConsumerError> {
        if !self.connect_at_startup().await? {
            return Ok(());
        }

        loop {
            match self.consume().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_connection() => {
                    warn!(error = %e, "Broker connection lost, reconnecting")
                }
                Err(e) => warn!(error = %e, "Broker command failed, reconnecting"),
            }
            if !self.reconnect().await {
                return Ok(());
            }
        }
    }

    /// `Ok(false)` if stopped while connecting.
    async fn connect_at_startup(&mut self) -> Result<bool, ConsumerError> {
        let attempts = self.config.startup_attempts.max(1);
        let mut delay = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if self.stop_requested() {
                return Ok(false);
            }
            self.set_state(ConsumerState::Connecting);

            match self.broker.connect().await {
                Ok(()) => {
                    info!(attempt, "Token consumer connected");
                    return Ok(true);
                }
                Err(e) => {
                    error!(attempt, max_attempts = attempts, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }

            self.set_state(ConsumerState::Disconnected);
            if attempt < attempts {
                if self.sleep_or_stop(delay).await {
                    return Ok(false);
                }
                delay = self.next_backoff(delay);
            }
        }

        Err(ConsumerError::ConnectFailed {
            attempts,
            last_error,
        })
    }

    /// Retry until connected (`true`) or stopped (`false`).
    async fn reconnect(&mut self) -> bool {
        let mut delay = self.config.initial_backoff;
        loop {
            self.set_state(ConsumerState::Reconnecting);
            if self.sleep_or_stop(delay).await {
                return false;
            }

            self.set_state(ConsumerState::Connecting);
            match self.broker.connect().await {
                Ok(()) => {
                    info!("Token consumer reconnected");
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Reconnect failed");
                    delay = self.next_backoff(delay);
                }
            }
        }
    }

    /// Drain leftovers, then read new entries until stopped (`Ok`) or the
    /// broker fails (`Err`).
    async fn consume(&mut self) -> Result<(), BrokerError> {
        self.set_state(ConsumerState::Consuming);

        loop {
            let pending = self.broker.pending(self.config.batch_size).await?;
            if pending.is_empty() {
                break;
            }
            info!(count = pending.len(), "Replaying unacknowledged deliveries");
            for delivery in pending {
                self.handle(delivery).await?;
            }
        }

        loop {
            if self.stop_requested() {
                return Ok(());
            }
            let batch = tokio::select! {
                _ = self.stop.changed() => return Ok(()),
                batch = self.broker.receive(self.config.batch_size, self.config.block) => batch?,
            };
            for delivery in batch {
                self.handle(delivery).await?;
            }
        }
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<(), BrokerError> {
        if delivery.routing_key.as_deref() != Some(self.config.routing_key.as_str()) {
            debug!(
                message_id = %delivery.id,
                routing_key = ?delivery.routing_key,
                "Skipping entry for another routing key"
            );
            return self.broker.ack(&delivery.id).await;
        }

        let parsed = match delivery.payload.as_deref() {
            Some(payload) => TokenEvent::parse(payload.as_bytes()).map_err(|e| e.to_string()),
            None => Err("Missing payload".to_string()),
        };

        match parsed {
            Err(reason) => {
                error!(message_id = %delivery.id, reason = %reason, "Rejecting token message");
                self.broker.dead_letter(&delivery, &reason).await?;
            }
            Ok(event) if !event.is_token_validation() => {
                warn!(message_id = %delivery.id, action = ?event.action, "Unknown action");
            }
            Ok(event) => {
                self.cache.store(&event);
                debug!(message_id = %delivery.id, user_id = ?event.user_id, "Token message processed");
            }
        }

        self.broker.ack(&delivery.id).await
    }

    fn next_backoff(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.config.max_backoff)
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep for `delay`; `true` if a stop arrived first.
    async fn sleep_or_stop(&mut self, delay: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.stop.changed() => true,
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Consumer state change");
            *current = state;
            true
        });
    }
}
