//! Queue on a Redis stream with consumer-group semantics.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use super::{QueueError, QueueMessage, QueueReader, TaskQueue};
use crate::config::QueueConfig;

/// Stream entry field holding the task payload.
const PAYLOAD_FIELD: &str = "value";

async fn open(url: &str) -> Result<ConnectionManager, QueueError> {
    let client = redis::Client::open(url)
        .map_err(|e| QueueError::ConnectionFailed(format!("invalid queue URL: {e}")))?;
    ConnectionManager::new(client)
        .await
        .map_err(|e| QueueError::ConnectionFailed(e.to_string()))
}

/// Publishing half: appends entries with `XADD`.
#[derive(Clone)]
pub struct RedisStreamQueue {
    conn: ConnectionManager,
    stream: String,
}

impl fmt::Debug for RedisStreamQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStreamQueue")
            .field("stream", &self.stream)
            .finish()
    }
}

impl RedisStreamQueue {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        info!("Connecting queue producer to stream {}", config.stream);
        Ok(Self {
            conn: open(&config.url).await?,
            stream: config.stream.clone(),
        })
    }
}

#[async_trait]
impl TaskQueue for RedisStreamQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload.to_vec())])
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;
        debug!(stream = %self.stream, id = %id, "Queued task payload");
        Ok(())
    }
}

/// Consuming half: reads with `XREADGROUP` and acknowledges each entry
/// immediately.
pub struct RedisStreamReader {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    block_ms: u64,
}

impl fmt::Debug for RedisStreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStreamReader")
            .field("stream", &self.stream)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .finish()
    }
}

impl RedisStreamReader {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let mut conn = open(&config.url).await?;

        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&config.stream, &config.group, "0")
            .await;
        match created {
            Ok(()) => info!(
                "Created consumer group {} on stream {}",
                config.group, config.stream
            ),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Consumer group {} already exists", config.group)
            }
            Err(e) => return Err(QueueError::ConnectionFailed(e.to_string())),
        }

        let consumer = config
            .consumer
            .clone()
            .unwrap_or_else(|| format!("dispatcher-{}", uuid::Uuid::new_v4().simple()));
        info!(
            "Queue consumer {} joined group {} on stream {}",
            consumer, config.group, config.stream
        );

        Ok(Self {
            conn,
            stream: config.stream.clone(),
            group: config.group.clone(),
            consumer,
            block_ms: config.block_ms,
        })
    }
}

#[async_trait]
impl QueueReader for RedisStreamReader {
    async fn read_message(&mut self) -> Result<QueueMessage, QueueError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .block(self.block_ms as usize)
            .count(1);

        loop {
            let reply: Option<StreamReadReply> = self
                .conn
                .xread_options(&[&self.stream], &[">"], &options)
                .await
                .map_err(|e| QueueError::Read(e.to_string()))?;

            let Some(entry) = reply
                .into_iter()
                .flat_map(|r| r.keys)
                .flat_map(|k| k.ids)
                .next()
            else {
                // block window elapsed without entries
                continue;
            };

            let acked: Result<i64, redis::RedisError> = self
                .conn
                .xack(&self.stream, &self.group, &[&entry.id])
                .await;
            if let Err(e) = acked {
                warn!(id = %entry.id, "Failed to acknowledge queue entry: {}", e);
            }

            let payload = entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default();
            return Ok(QueueMessage {
                id: entry.id,
                payload,
            });
        }
    }
}
