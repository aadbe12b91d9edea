//! Task registry: the single owner of task lifecycle state.
//!
//! State lives in two places. The ephemeral store holds the processing set,
//! the completed list and the image URL side lookup; the durable task log
//! keeps one row per topic. Transitions touch both and are not atomic across
//! them, but transitions issued through one registry are serialized.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::metrics::TASKS_COMPLETED;
use crate::state::{StateError, StateStore};
use crate::task::{
    CompletedRecord, StatusSnapshot, Task, TaskDescriptor, TaskLog, TaskLogError, TaskStatus,
};

/// Upper bound on the durable completed history query.
pub const MAX_HISTORY: usize = 100;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Task log error: {0}")]
    Log(#[from] TaskLogError),
}

pub struct TaskRegistry {
    state: Arc<dyn StateStore>,
    log: Arc<dyn TaskLog>,
    completed_window: usize,
    transitions: Mutex<()>,
}

impl TaskRegistry {
    /// `completed_window` bounds how many completed records a status query
    /// returns.
    pub fn new(state: Arc<dyn StateStore>, log: Arc<dyn TaskLog>, completed_window: usize) -> Self {
        Self {
            state,
            log,
            completed_window,
            transitions: Mutex::new(()),
        }
    }

    /// Record a submitted task. Returns `false` if the topic was already
    /// known; the existing record is left untouched.
    pub fn register_queued(&self, task: &TaskDescriptor) -> Result<bool, RegistryError> {
        let inserted = self.log.insert_queued(&task.topic_name, &task.image_url)?;
        if inserted {
            info!(topic = %task.topic_name, "Task queued");
        } else {
            debug!(topic = %task.topic_name, "Task already registered, ignoring resubmission");
        }
        Ok(inserted)
    }

    /// Put a task in the processing set at progress 0 and remember its image.
    ///
    /// Returns `false` and changes nothing when the topic has already
    /// completed, so a resubmitted finished task never reenters processing.
    pub async fn register_processing(&self, topic: &str, image_url: &str) -> Result<bool, RegistryError> {
        let _guard = self.transitions.lock().await;

        if self.completed_record(topic).await?.is_some() {
            info!(topic = %topic, "Task already completed, not processing again");
            return Ok(false);
        }

        self.state.set_progress(topic, 0).await?;
        self.state.set_image_url(topic, image_url).await?;

        match self.log.mark_processing(topic) {
            Ok(true) => {}
            Ok(false) => debug!(topic = %topic, "No queued row to mark processing"),
            Err(e) => warn!(topic = %topic, "Failed to mark task processing: {}", e),
        }

        info!(topic = %topic, "Task processing");
        Ok(true)
    }

    /// Overwrite the progress of a processing task. Values are stored as
    /// given. Returns `false` (and stores nothing) when the topic is not in
    /// the processing set, so late reports cannot resurrect finished tasks.
    pub async fn update_progress(&self, topic: &str, percent: i64) -> Result<bool, RegistryError> {
        let _guard = self.transitions.lock().await;

        if self.state.progress(topic).await?.is_none() {
            debug!(topic = %topic, "Progress for a task that is not processing");
            return Ok(false);
        }
        self.state.set_progress(topic, percent).await?;
        Ok(true)
    }

    /// Move a task from processing to completed.
    ///
    /// When `image_url` is absent or empty it is backfilled from the side
    /// lookup, then from the durable record; if both miss it stays empty.
    /// A topic completes once: repeated completions return the first record
    /// and append nothing.
    pub async fn complete_task(
        &self,
        topic: &str,
        result_url: &str,
        image_url: Option<&str>,
    ) -> Result<CompletedRecord, RegistryError> {
        let _guard = self.transitions.lock().await;

        if let Some(existing) = self.completed_record(topic).await? {
            self.state.remove_processing(topic).await?;
            warn!(topic = %topic, result = %result_url, "Ignoring repeated completion");
            return Ok(existing);
        }

        if !self.state.remove_processing(topic).await? {
            debug!(topic = %topic, "Completed task was not in the processing set");
        }

        let image_url = match image_url.filter(|url| !url.is_empty()) {
            Some(url) => url.to_string(),
            None => self.lookup_image_url(topic).await,
        };

        let completed_at = Utc::now();
        let record = CompletedRecord {
            name: topic.to_string(),
            image_url,
            upscaled_url: result_url.to_string(),
            completed_at: Some(completed_at),
        };

        self.state.append_completed(&record).await?;
        self.log
            .mark_completed(topic, &record.image_url, result_url, completed_at)?;

        TASKS_COMPLETED.inc();
        info!(topic = %topic, result = %result_url, "Task completed");
        Ok(record)
    }

    /// The record of an already completed topic, from the durable log or,
    /// failing that, the completed list.
    async fn completed_record(&self, topic: &str) -> Result<Option<CompletedRecord>, RegistryError> {
        if let Some(task) = self.log.get(topic)? {
            if task.status == TaskStatus::Completed {
                return Ok(Some(CompletedRecord {
                    name: task.topic_name,
                    image_url: task.image_url,
                    upscaled_url: task.result_url.unwrap_or_default(),
                    completed_at: task.completed_at,
                }));
            }
        }
        Ok(self
            .state
            .recent_completed(self.completed_window)
            .await?
            .into_iter()
            .rfind(|record| record.name == topic))
    }

    /// Lookup failures degrade to an empty URL rather than failing the
    /// completion.
    async fn lookup_image_url(&self, topic: &str) -> String {
        match self.state.image_url(topic).await {
            Ok(Some(url)) => return url,
            Ok(None) => {}
            Err(e) => warn!(topic = %topic, "Image URL lookup failed: {}", e),
        }
        match self.log.get(topic) {
            Ok(Some(task)) => return task.image_url,
            Ok(None) => {}
            Err(e) => warn!(topic = %topic, "Task log lookup failed: {}", e),
        }
        warn!(topic = %topic, "No image URL known for completed task");
        String::new()
    }

    /// Processing entries plus the most recent completed records.
    pub async fn list_status(&self) -> Result<StatusSnapshot, RegistryError> {
        let processing = self.state.processing().await?;
        let processed = self.state.recent_completed(self.completed_window).await?;
        Ok(StatusSnapshot {
            processing,
            processed,
        })
    }

    /// Completed tasks from the durable log, newest first. `limit` is
    /// clamped to `1..=MAX_HISTORY`.
    pub fn completed_history(&self, limit: usize) -> Result<Vec<Task>, RegistryError> {
        let limit = limit.clamp(1, MAX_HISTORY);
        Ok(self.log.list_completed(limit)?)
    }

    /// One task from the durable log, with live progress attached while it
    /// is processing.
    pub async fn task(&self, topic: &str) -> Result<Option<Task>, RegistryError> {
        let Some(mut task) = self.log.get(topic)? else {
            return Ok(None);
        };
        task.progress = self.state.progress(topic).await?;
        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SqliteTaskLog;
    use crate::testing::MemoryStateStore;

    fn create_registry() -> (TaskRegistry, Arc<MemoryStateStore>) {
        let state = Arc::new(MemoryStateStore::new());
        let log = Arc::new(SqliteTaskLog::in_memory().unwrap());
        (TaskRegistry::new(state.clone(), log, 100), state)
    }

    #[tokio::test]
    async fn test_processing_then_complete_moves_task() {
        let (registry, _) = create_registry();
        registry
            .register_queued(&TaskDescriptor::new("cat-photo", "http://x/cat.jpg"))
            .unwrap();
        registry
            .register_processing("cat-photo", "http://x/cat.jpg")
            .await
            .unwrap();

        let status = registry.list_status().await.unwrap();
        assert_eq!(status.processing.len(), 1);
        assert_eq!(status.processing[0].progress, 0);
        assert!(status.processed.is_empty());

        let record = registry
            .complete_task("cat-photo", "http://x/cat-4k.jpg", None)
            .await
            .unwrap();
        assert_eq!(record.image_url, "http://x/cat.jpg");

        let status = registry.list_status().await.unwrap();
        assert!(status.processing.is_empty());
        assert_eq!(status.processed.len(), 1);
        assert_eq!(status.processed[0].name, "cat-photo");
        assert_eq!(status.processed[0].upscaled_url, "http://x/cat-4k.jpg");

        let task = registry.task("cat-photo").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_url.as_deref(), Some("http://x/cat-4k.jpg"));
        assert!(task.progress.is_none());
    }

    #[tokio::test]
    async fn test_resubmission_keeps_original_record() {
        let (registry, _) = create_registry();
        assert!(registry
            .register_queued(&TaskDescriptor::new("t", "http://x/one.jpg"))
            .unwrap());
        assert!(!registry
            .register_queued(&TaskDescriptor::new("t", "http://x/two.jpg"))
            .unwrap());

        let task = registry.task("t").await.unwrap().unwrap();
        assert_eq!(task.image_url, "http://x/one.jpg");
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn test_progress_is_stored_verbatim() {
        let (registry, _) = create_registry();
        registry.register_processing("t", "http://x/t.jpg").await.unwrap();

        assert!(registry.update_progress("t", 80).await.unwrap());
        assert!(registry.update_progress("t", 30).await.unwrap());
        assert!(registry.update_progress("t", 140).await.unwrap());

        let status = registry.list_status().await.unwrap();
        assert_eq!(status.processing[0].progress, 140);
    }

    #[tokio::test]
    async fn test_progress_for_unknown_task_is_ignored() {
        let (registry, _) = create_registry();
        assert!(!registry.update_progress("ghost", 50).await.unwrap());
        assert!(registry.list_status().await.unwrap().processing.is_empty());
    }

    #[tokio::test]
    async fn test_late_progress_does_not_resurrect_completed_task() {
        let (registry, _) = create_registry();
        registry.register_processing("t", "http://x/t.jpg").await.unwrap();
        registry
            .complete_task("t", "http://x/t-4k.jpg", None)
            .await
            .unwrap();

        assert!(!registry.update_progress("t", 99).await.unwrap());
        let status = registry.list_status().await.unwrap();
        assert!(status.processing.is_empty());
        assert_eq!(status.processed.len(), 1);
    }

    #[tokio::test]
    async fn test_task_reports_live_progress() {
        let (registry, _) = create_registry();
        registry
            .register_queued(&TaskDescriptor::new("t", "http://x/t.jpg"))
            .unwrap();
        registry.register_processing("t", "http://x/t.jpg").await.unwrap();
        registry.update_progress("t", 42).await.unwrap();

        let task = registry.task("t").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.progress, Some(42));
    }

    #[tokio::test]
    async fn test_completion_prefers_supplied_image_url() {
        let (registry, _) = create_registry();
        registry.register_processing("t", "http://x/old.jpg").await.unwrap();

        let record = registry
            .complete_task("t", "http://x/out.jpg", Some("http://x/new.jpg"))
            .await
            .unwrap();
        assert_eq!(record.image_url, "http://x/new.jpg");
    }

    #[tokio::test]
    async fn test_completion_without_any_image_url_is_empty() {
        let (registry, _) = create_registry();
        let record = registry
            .complete_task("unknown", "http://x/out.jpg", Some(""))
            .await
            .unwrap();
        assert_eq!(record.image_url, "");
        assert_eq!(record.upscaled_url, "http://x/out.jpg");
    }

    #[tokio::test]
    async fn test_completion_backfills_from_durable_log() {
        let (registry, _) = create_registry();
        registry
            .register_queued(&TaskDescriptor::new("t", "http://x/logged.jpg"))
            .unwrap();

        let record = registry
            .complete_task("t", "http://x/out.jpg", None)
            .await
            .unwrap();
        assert_eq!(record.image_url, "http://x/logged.jpg");
    }

    #[tokio::test]
    async fn test_status_window_is_bounded() {
        let state = Arc::new(MemoryStateStore::new());
        let log = Arc::new(SqliteTaskLog::in_memory().unwrap());
        let registry = TaskRegistry::new(state, log, 2);

        for i in 0..4 {
            let topic = format!("t-{}", i);
            registry.register_processing(&topic, "http://x/in.jpg").await.unwrap();
            registry
                .complete_task(&topic, "http://x/out.jpg", None)
                .await
                .unwrap();
        }

        let names: Vec<_> = registry
            .list_status()
            .await
            .unwrap()
            .processed
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["t-2", "t-3"]);
    }

    #[tokio::test]
    async fn test_completed_history_clamps_limit() {
        let (registry, _) = create_registry();
        for i in 0..3 {
            registry
                .complete_task(&format!("t-{}", i), "http://x/out.jpg", None)
                .await
                .unwrap();
        }
        assert_eq!(registry.completed_history(0).unwrap().len(), 1);
        assert_eq!(registry.completed_history(10_000).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_completed_topic_does_not_reenter_processing() {
        let (registry, state) = create_registry();
        registry
            .register_queued(&TaskDescriptor::new("cat-photo", "http://x/cat.jpg"))
            .unwrap();
        assert!(registry
            .register_processing("cat-photo", "http://x/cat.jpg")
            .await
            .unwrap());
        registry
            .complete_task("cat-photo", "http://x/cat-4k.jpg", None)
            .await
            .unwrap();

        assert!(!registry
            .register_processing("cat-photo", "http://x/cat.jpg")
            .await
            .unwrap());

        let status = registry.list_status().await.unwrap();
        assert!(status.processing.is_empty());
        assert_eq!(status.processed.len(), 1);
        assert_eq!(state.completed().await.len(), 1);
        let task = registry.task("cat-photo").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_completion_returns_first_record() {
        let (registry, state) = create_registry();
        registry.register_processing("t", "http://x/t.jpg").await.unwrap();
        let first = registry
            .complete_task("t", "http://x/t-4k.jpg", None)
            .await
            .unwrap();

        let second = registry
            .complete_task("t", "http://x/other.jpg", None)
            .await
            .unwrap();
        assert_eq!(second.upscaled_url, "http://x/t-4k.jpg");
        assert_eq!(second.image_url, first.image_url);

        let completed = state.completed().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].upscaled_url, "http://x/t-4k.jpg");
        assert!(registry.list_status().await.unwrap().processing.is_empty());
    }

    #[tokio::test]
    async fn test_completed_list_alone_blocks_reprocessing() {
        let (registry, state) = create_registry();
        state
            .append_completed(&CompletedRecord {
                name: "legacy".to_string(),
                image_url: "http://x/legacy.jpg".to_string(),
                upscaled_url: "http://x/legacy-4k.jpg".to_string(),
                completed_at: None,
            })
            .await
            .unwrap();

        assert!(!registry
            .register_processing("legacy", "http://x/legacy.jpg")
            .await
            .unwrap());
        assert!(registry.list_status().await.unwrap().processing.is_empty());
    }

    #[tokio::test]
    async fn test_image_lookup_failure_still_completes_task() {
        let (registry, state) = create_registry();
        registry
            .register_queued(&TaskDescriptor::new("t", "http://x/logged.jpg"))
            .unwrap();
        registry.register_processing("t", "http://x/t.jpg").await.unwrap();
        state.set_fail_image_url(true);

        let record = registry
            .complete_task("t", "http://x/t-4k.jpg", None)
            .await
            .unwrap();
        assert_eq!(record.image_url, "http://x/logged.jpg");

        let status = registry.list_status().await.unwrap();
        assert!(status.processing.is_empty());
        assert_eq!(status.processed.len(), 1);
        assert_eq!(status.processed[0].image_url, "http://x/logged.jpg");
        let task = registry.task("t").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_image_lookup_failure_without_record_is_empty() {
        let (registry, state) = create_registry();
        registry.register_processing("t", "http://x/t.jpg").await.unwrap();
        state.set_fail_image_url(true);

        let record = registry
            .complete_task("t", "http://x/t-4k.jpg", None)
            .await
            .unwrap();
        assert_eq!(record.image_url, "");
        assert_eq!(registry.list_status().await.unwrap().processed.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_error() {
        let (registry, state) = create_registry();
        state.set_fail(true);
        let err = registry
            .register_processing("t", "http://x/t.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::State(_)));
    }
}
