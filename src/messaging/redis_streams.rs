//! Redis Streams token broker (durable, at-least-once delivery).
//!
//! ## Layout
//!
//! - **Stream**: the routed topic the user service appends token events to.
//!   Each entry carries `routing_key` and `payload` fields.
//! - **Consumer group**: the durable queue bound to the stream. Entries stay
//!   pending for this consumer until `XACK`.
//! - **Dead-letter stream**: rejected entries are copied here with
//!   `original_message_id`, `reason` and `failed_at`.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use tracing::{info, warn};

use super::broker::{BrokerError, Delivery, TokenBroker};

/// Stream, group and consumer names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTopology {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub dead_letter_stream: String,
}

pub struct RedisStreamsBroker {
    client: redis::Client,
    topology: StreamTopology,
    conn: Option<MultiplexedConnection>,
}

fn classify(e: redis::RedisError) -> BrokerError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        BrokerError::Connection(e.to_string())
    } else {
        BrokerError::Command(e.to_string())
    }
}

fn to_delivery(entry: StreamId) -> Delivery {
    Delivery {
        routing_key: entry.get::<String>("routing_key"),
        payload: entry.get::<String>("payload"),
        id: entry.id,
    }
}

impl RedisStreamsBroker {
    /// Parse the URL. No connection is made until [`TokenBroker::connect`].
    pub fn new(redis_url: &str, topology: StreamTopology) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::Connection(format!("Invalid Redis URL: {}", e)))?;
        Ok(Self {
            client,
            topology,
            conn: None,
        })
    }

    pub fn topology(&self) -> &StreamTopology {
        &self.topology
    }

    fn conn(&mut self) -> Result<&mut MultiplexedConnection, BrokerError> {
        self.conn
            .as_mut()
            .ok_or_else(|| BrokerError::Connection("Not connected".to_string()))
    }

    /// Forget the connection after a transport failure.
    fn check<T>(&mut self, result: redis::RedisResult<T>) -> Result<T, BrokerError> {
        result.map_err(|e| {
            let err = classify(e);
            if err.is_connection() {
                self.conn = None;
            }
            err
        })
    }

    async fn read_group(
        &mut self,
        start_id: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let mut opts = StreamReadOptions::default()
            .group(&self.topology.group, &self.topology.consumer)
            .count(count);
        if let Some(block) = block {
            opts = opts.block(block.as_millis() as usize);
        }
        let stream = self.topology.stream.clone();

        let conn = self.conn()?;
        let result: redis::RedisResult<Option<StreamReadReply>> =
            conn.xread_options(&[&stream], &[start_id], &opts).await;
        let reply = self.check(result)?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(to_delivery)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Append an event to the stream. Returns the entry id.
    pub async fn publish(&mut self, routing_key: &str, payload: &str) -> Result<String, BrokerError> {
        let stream = self.topology.stream.clone();
        let conn = self.conn()?;
        let result: redis::RedisResult<String> = conn
            .xadd(
                &stream,
                "*",
                &[("routing_key", routing_key), ("payload", payload)],
            )
            .await;
        self.check(result)
    }
}

#[async_trait]
impl TokenBroker for RedisStreamsBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.conn = None;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)?;

        // XGROUP CREATE ... $ MKSTREAM; an existing group answers BUSYGROUP
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.topology.stream, &self.topology.group, "$")
            .await;
        match created {
            Ok(()) => info!(
                stream = %self.topology.stream,
                group = %self.topology.group,
                "Consumer group created"
            ),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(classify(e)),
        }

        info!(
            stream = %self.topology.stream,
            group = %self.topology.group,
            consumer = %self.topology.consumer,
            dead_letter = %self.topology.dead_letter_stream,
            "Connected to Redis Streams"
        );
        self.conn = Some(conn);
        Ok(())
    }

    async fn pending(&mut self, count: usize) -> Result<Vec<Delivery>, BrokerError> {
        self.read_group("0", count, None).await
    }

    async fn receive(
        &mut self,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, BrokerError> {
        self.read_group(">", count, Some(block)).await
    }

    async fn ack(&mut self, delivery_id: &str) -> Result<(), BrokerError> {
        let stream = self.topology.stream.clone();
        let group = self.topology.group.clone();
        let conn = self.conn()?;
        let result: redis::RedisResult<i64> = conn.xack(&stream, &group, &[delivery_id]).await;
        self.check(result)?;
        Ok(())
    }

    async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError> {
        let dlq = self.topology.dead_letter_stream.clone();
        let failed_at = chrono::Utc::now().to_rfc3339();
        let fields = [
            ("original_message_id", delivery.id.as_str()),
            ("reason", reason),
            ("failed_at", failed_at.as_str()),
            ("routing_key", delivery.routing_key.as_deref().unwrap_or("")),
            ("payload", delivery.payload.as_deref().unwrap_or("")),
        ];

        let conn = self.conn()?;
        let result: redis::RedisResult<String> = conn.xadd(&dlq, "*", &fields).await;
        self.check(result)?;

        warn!(
            message_id = %delivery.id,
            reason,
            "Message sent to dead-letter stream"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379";

    fn topology(suffix: &str) -> StreamTopology {
        StreamTopology {
            stream: format!("test:auth_tokens:{}", suffix),
            group: "test_group".to_string(),
            consumer: "test_consumer".to_string(),
            dead_letter_stream: format!("test:auth_tokens:{}:dlq", suffix),
        }
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = RedisStreamsBroker::new("not a url", topology("x")).err();
        assert!(matches!(err, Some(BrokerError::Connection(_))));
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut broker = RedisStreamsBroker::new(TEST_REDIS_URL, topology("x")).unwrap();
        let err = broker.ack("0-1").await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_publish_receive_ack_roundtrip() {
        let suffix = uuid::Uuid::new_v4().to_string();
        let mut broker = RedisStreamsBroker::new(TEST_REDIS_URL, topology(&suffix)).unwrap();
        broker.connect().await.unwrap();
        // second connect hits BUSYGROUP and succeeds
        broker.connect().await.unwrap();

        let id = broker.publish("auth.token", r#"{"token":"t"}"#).await.unwrap();
        let batch = broker
            .receive(10, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].routing_key.as_deref(), Some("auth.token"));

        // unacked entries come back as pending
        let pending = broker.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        broker.dead_letter(&pending[0], "test").await.unwrap();
        broker.ack(&id).await.unwrap();
        assert!(broker.pending(10).await.unwrap().is_empty());
    }
}
