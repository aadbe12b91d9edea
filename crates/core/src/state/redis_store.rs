//! Redis-backed state store.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use super::{StateError, StateStore};
use crate::task::{CompletedRecord, ProcessingEntry};

/// Hash of topic → progress for in-flight tasks.
const PROCESSING_KEY: &str = "processingTopics";
/// List of JSON completion records, oldest first.
const PROCESSED_KEY: &str = "processedTopics";
/// Prefix of the per-topic source image lookup.
const IMAGE_URL_PREFIX: &str = "imageURL:";

/// State store on a Redis server, sharing its key layout with the
/// processing engine.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStateStore {
    /// Connect to the store. Fails if the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, StateError> {
        info!("Connecting to state store at {}", url);

        let client = redis::Client::open(url)
            .map_err(|e| StateError::ConnectionFailed(format!("invalid store URL: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StateError::ConnectionFailed(e.to_string()))?;

        Ok(Self { conn })
    }

    fn image_url_key(topic: &str) -> String {
        format!("{IMAGE_URL_PREFIX}{topic}")
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn ping(&self) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StateError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn set_progress(&self, topic: &str, progress: i64) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(PROCESSING_KEY, topic, progress.to_string())
            .await
            .map_err(command_err)
    }

    async fn progress(&self, topic: &str) -> Result<Option<i64>, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(PROCESSING_KEY, topic).await.map_err(command_err)?;
        Ok(raw.map(|value| parse_progress(&value).unwrap_or(0)))
    }

    async fn remove_processing(&self, topic: &str) -> Result<bool, StateError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(PROCESSING_KEY, topic)
            .await
            .map_err(command_err)?;
        Ok(removed > 0)
    }

    async fn processing(&self) -> Result<Vec<ProcessingEntry>, StateError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> =
            conn.hgetall(PROCESSING_KEY).await.map_err(command_err)?;

        let mut entries: Vec<ProcessingEntry> = raw
            .into_iter()
            .map(|(name, value)| {
                let progress = parse_progress(&value).unwrap_or_else(|| {
                    warn!(topic = %name, value = %value, "Unreadable progress value");
                    0
                });
                ProcessingEntry { name, progress }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn set_image_url(&self, topic: &str, image_url: &str) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::image_url_key(topic), image_url)
            .await
            .map_err(command_err)
    }

    async fn image_url(&self, topic: &str) -> Result<Option<String>, StateError> {
        let mut conn = self.conn.clone();
        conn.get(Self::image_url_key(topic))
            .await
            .map_err(command_err)
    }

    async fn append_completed(&self, record: &CompletedRecord) -> Result<(), StateError> {
        let json =
            serde_json::to_string(record).map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(PROCESSED_KEY, json)
            .await
            .map_err(command_err)
    }

    async fn recent_completed(&self, limit: usize) -> Result<Vec<CompletedRecord>, StateError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = -(limit.min(isize::MAX as usize) as isize);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(PROCESSED_KEY, start, -1)
            .await
            .map_err(command_err)?;

        Ok(raw.into_iter().map(|item| parse_completed(&item)).collect())
    }
}

fn command_err(e: redis::RedisError) -> StateError {
    StateError::Command(e.to_string())
}

/// Progress values are written by several producers; accept integers and
/// decimal strings, truncating fractions.
pub(crate) fn parse_progress(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}

/// Older producers pushed bare topic names instead of JSON records.
fn parse_completed(item: &str) -> CompletedRecord {
    serde_json::from_str(item).unwrap_or_else(|_| {
        debug!("Completed entry is not JSON, treating it as a topic name");
        CompletedRecord {
            name: item.to_string(),
            image_url: String::new(),
            upscaled_url: String::new(),
            completed_at: None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_integer_and_decimal() {
        assert_eq!(parse_progress("0"), Some(0));
        assert_eq!(parse_progress(" 42 "), Some(42));
        assert_eq!(parse_progress("57.9"), Some(57));
        assert_eq!(parse_progress("-3"), Some(-3));
        assert_eq!(parse_progress("150"), Some(150));
        assert_eq!(parse_progress("half"), None);
        assert_eq!(parse_progress("NaN"), None);
    }

    #[test]
    fn test_parse_completed_json_record() {
        let record = parse_completed(
            r#"{"name":"cat","imageURL":"http://x/cat.jpg","upscaledURL":"http://x/cat-4k.jpg"}"#,
        );
        assert_eq!(record.name, "cat");
        assert_eq!(record.image_url, "http://x/cat.jpg");
        assert_eq!(record.upscaled_url, "http://x/cat-4k.jpg");
    }

    #[test]
    fn test_parse_completed_bare_name() {
        let record = parse_completed("legacy-topic");
        assert_eq!(record.name, "legacy-topic");
        assert!(record.image_url.is_empty());
        assert!(record.upscaled_url.is_empty());
    }

    #[test]
    fn test_image_url_key_layout() {
        assert_eq!(RedisStateStore::image_url_key("cat"), "imageURL:cat");
    }
}
