//! Durable ordered task queue.
//!
//! Producers append raw task payloads; a single consumer group drains them.
//! Entries are committed as soon as they are read, so a payload that later
//! fails to parse is still consumed (there is no dead-letter capture).

mod redis_stream;

pub use redis_stream::{RedisStreamQueue, RedisStreamReader};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Queue read failed: {0}")]
    Read(String),

    #[error("Queue publish failed: {0}")]
    Publish(String),
}

/// One entry taken off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Broker-assigned entry id, for logging.
    pub id: String,
    pub payload: Vec<u8>,
}

/// Producer side of the queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a payload unchanged.
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError>;
}

/// Consumer side of the queue, owned by exactly one read loop.
#[async_trait]
pub trait QueueReader: Send + Sync {
    /// Wait for the next entry and commit it before returning.
    async fn read_message(&mut self) -> Result<QueueMessage, QueueError>;
}
