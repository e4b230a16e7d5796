//! Broker seam for the token consumer.
//!
//! The consumer only needs a durable, acknowledged, routed channel with a
//! dead-letter companion. [`TokenBroker`] captures that; the Redis Streams
//! implementation lives in [`super::redis_streams`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Transport-level failure; the consumer reconnects.
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker command error: {0}")]
    Command(String),
}

impl BrokerError {
    pub fn is_connection(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }
}

/// One entry handed to the consumer. Must be acknowledged by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub routing_key: Option<String>,
    pub payload: Option<String>,
}

#[async_trait]
pub trait TokenBroker: Send {
    /// Connect and declare the topic, consumer group and dead-letter channel.
    /// Called again after every connection loss.
    async fn connect(&mut self) -> Result<(), BrokerError>;

    /// Deliveries handed to this consumer earlier but never acknowledged.
    async fn pending(&mut self, count: usize) -> Result<Vec<Delivery>, BrokerError>;

    /// New deliveries, waiting up to `block` for the first one.
    async fn receive(&mut self, count: usize, block: Duration)
    -> Result<Vec<Delivery>, BrokerError>;

    async fn ack(&mut self, delivery_id: &str) -> Result<(), BrokerError>;

    /// Copy a delivery to the dead-letter channel. Does not acknowledge it.
    async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError>;
}

/// Scripted in-memory broker for consumer tests.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// What the next `connect` / `receive` call does.
    #[derive(Debug, Clone)]
    pub enum Step {
        Deliver(Vec<Delivery>),
        Fail(BrokerError),
    }

    #[derive(Debug, Default)]
    pub struct Recorded {
        pub connects: usize,
        pub acked: Vec<String>,
        pub dead_lettered: Vec<(String, String)>,
    }

    #[derive(Clone, Default)]
    pub struct ScriptedBroker {
        pub connect_results: Arc<Mutex<VecDeque<Result<(), BrokerError>>>>,
        pub steps: Arc<Mutex<VecDeque<Step>>>,
        pub pending: Arc<Mutex<Vec<Delivery>>>,
        pub recorded: Arc<Mutex<Recorded>>,
    }

    impl ScriptedBroker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_connects(&self, n: usize) {
            let mut results = self.connect_results.lock().unwrap();
            for _ in 0..n {
                results.push_back(Err(BrokerError::Connection("connection refused".into())));
            }
        }

        pub fn push(&self, step: Step) {
            self.steps.lock().unwrap().push_back(step);
        }

        pub fn add_pending(&self, delivery: Delivery) {
            self.pending.lock().unwrap().push(delivery);
        }
    }

    pub fn delivery(id: &str, payload: &str) -> Delivery {
        Delivery {
            id: id.to_string(),
            routing_key: Some("auth.token".to_string()),
            payload: Some(payload.to_string()),
        }
    }

    #[async_trait]
    impl TokenBroker for ScriptedBroker {
        async fn connect(&mut self) -> Result<(), BrokerError> {
            self.recorded.lock().unwrap().connects += 1;
            self.connect_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn pending(&mut self, count: usize) -> Result<Vec<Delivery>, BrokerError> {
            let mut pending = self.pending.lock().unwrap();
            let n = count.min(pending.len());
            Ok(pending.drain(..n).collect())
        }

        async fn receive(
            &mut self,
            _count: usize,
            block: Duration,
        ) -> Result<Vec<Delivery>, BrokerError> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Deliver(batch)) => Ok(batch),
                Some(Step::Fail(e)) => Err(e),
                None => {
                    tokio::time::sleep(block).await;
                    Ok(vec![])
                }
            }
        }

        async fn ack(&mut self, delivery_id: &str) -> Result<(), BrokerError> {
            self.recorded
                .lock()
                .unwrap()
                .acked
                .push(delivery_id.to_string());
            Ok(())
        }

        async fn dead_letter(
            &mut self,
            delivery: &Delivery,
            reason: &str,
        ) -> Result<(), BrokerError> {
            self.recorded
                .lock()
                .unwrap()
                .dead_lettered
                .push((delivery.id.clone(), reason.to_string()));
            Ok(())
        }
    }
}
