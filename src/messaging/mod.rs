//! Token distribution channel
//!
//! The user service publishes a [`TokenEvent`] per login; the
//! [`TokenConsumer`] feeds them into the token cache.

pub mod broker;
pub mod consumer;
pub mod event;
pub mod redis_streams;

pub use broker::{BrokerError, Delivery, TokenBroker};
pub use consumer::{
    ConsumerConfig, ConsumerError, ConsumerHandle, ConsumerState, ConsumerStopper, TokenConsumer,
};
pub use event::{EventError, TokenEvent, VALIDATE_TOKEN_ACTION};
pub use redis_streams::{RedisStreamsBroker, StreamTopology};
