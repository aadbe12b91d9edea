//! Pub/sub event channels carrying completion and progress messages from
//! the processing engine.

mod redis_pubsub;

pub use redis_pubsub::RedisEventBroker;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription closed")]
    Closed,

    #[error("Unreadable payload: {0}")]
    Payload(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Source of named event channels.
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Open a subscription to one channel.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn EventSubscription>, EventError>;

    /// Publish a payload on a channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), EventError>;
}

/// A live subscription to one channel.
#[async_trait]
pub trait EventSubscription: Send {
    /// Wait for the next payload. A transport failure surfaces as an error;
    /// callers decide whether to keep receiving.
    async fn next_message(&mut self) -> Result<String, EventError>;
}
