//! Ephemeral task state: the processing set, the completed list, and the
//! image URL side lookup.

mod redis_store;

pub use redis_store::RedisStateStore;
pub(crate) use redis_store::parse_progress;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{CompletedRecord, ProcessingEntry};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key-value operations the task registry needs from its ephemeral store.
///
/// Implementations only store and fetch; ordering of multi-step transitions
/// is the registry's concern.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StateError>;

    /// Insert or overwrite a processing entry.
    async fn set_progress(&self, topic: &str, progress: i64) -> Result<(), StateError>;

    /// Progress of one processing entry, `None` if the topic is not processing.
    async fn progress(&self, topic: &str) -> Result<Option<i64>, StateError>;

    /// Remove a processing entry. Returns `true` if it existed.
    async fn remove_processing(&self, topic: &str) -> Result<bool, StateError>;

    /// All processing entries.
    async fn processing(&self) -> Result<Vec<ProcessingEntry>, StateError>;

    /// Remember the source image of a topic for later correlation.
    async fn set_image_url(&self, topic: &str, image_url: &str) -> Result<(), StateError>;

    /// Look up the source image of a topic.
    async fn image_url(&self, topic: &str) -> Result<Option<String>, StateError>;

    /// Append a record to the completed list.
    async fn append_completed(&self, record: &CompletedRecord) -> Result<(), StateError>;

    /// The most recent `limit` completed records, oldest first.
    async fn recent_completed(&self, limit: usize) -> Result<Vec<CompletedRecord>, StateError>;
}
