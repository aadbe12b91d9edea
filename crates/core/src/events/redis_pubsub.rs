//! Redis pub/sub broker.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Msg};
use tracing::{debug, info};

use super::{EventBroker, EventError, EventSubscription};

/// Broker over Redis pub/sub. Each subscription owns a dedicated pub/sub
/// connection; publishing shares a managed connection.
#[derive(Clone)]
pub struct RedisEventBroker {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl fmt::Debug for RedisEventBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisEventBroker").finish_non_exhaustive()
    }
}

impl RedisEventBroker {
    pub async fn connect(url: &str) -> Result<Self, EventError> {
        info!("Connecting event broker at {}", url);
        let client = redis::Client::open(url)
            .map_err(|e| EventError::ConnectionFailed(format!("invalid broker URL: {e}")))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| EventError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl EventBroker for RedisEventBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn EventSubscription>, EventError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| EventError::ConnectionFailed(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| EventError::ConnectionFailed(e.to_string()))?;
        debug!("Subscribed to channel {}", channel);

        Ok(Box::new(RedisSubscription {
            channel: channel.to_string(),
            messages: pubsub.into_on_message().boxed(),
        }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), EventError> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| EventError::Publish(e.to_string()))
    }
}

struct RedisSubscription {
    channel: String,
    messages: BoxStream<'static, Msg>,
}

#[async_trait]
impl EventSubscription for RedisSubscription {
    async fn next_message(&mut self) -> Result<String, EventError> {
        let msg = self.messages.next().await.ok_or(EventError::Closed)?;
        msg.get_payload::<String>().map_err(|e| {
            EventError::Payload(format!("channel {}: {}", self.channel, e))
        })
    }
}
