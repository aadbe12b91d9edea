//! Durable task log trait.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::Task;

#[derive(Debug, Error)]
pub enum TaskLogError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Permanent record of every submitted task.
///
/// Inserts are idempotent on the topic name: resubmitting a topic never
/// touches the existing row.
pub trait TaskLog: Send + Sync {
    /// Insert a queued task. Returns `false` when the topic already exists.
    fn insert_queued(&self, topic: &str, image_url: &str) -> Result<bool, TaskLogError>;

    /// Move an existing row to `processing`. Returns `false` if no row matched.
    fn mark_processing(&self, topic: &str) -> Result<bool, TaskLogError>;

    /// Record completion, creating the row if the task was never logged.
    fn mark_completed(
        &self,
        topic: &str,
        image_url: &str,
        result_url: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), TaskLogError>;

    /// Get a task by topic name.
    fn get(&self, topic: &str) -> Result<Option<Task>, TaskLogError>;

    /// Most recently completed tasks, newest first.
    fn list_completed(&self, limit: usize) -> Result<Vec<Task>, TaskLogError>;
}
