//! In-memory state store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::state::{StateError, StateStore};
use crate::task::{CompletedRecord, ProcessingEntry};

#[derive(Debug, Default)]
struct Inner {
    processing: HashMap<String, i64>,
    image_urls: HashMap<String, String>,
    completed: Vec<CompletedRecord>,
}

/// In-memory implementation of the StateStore trait.
///
/// Mirrors the Redis layout closely enough for registry tests and can be
/// switched into a failing mode to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: RwLock<Inner>,
    fail: AtomicBool,
    fail_image_url: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make only the image URL lookup fail.
    pub fn set_fail_image_url(&self, fail: bool) {
        self.fail_image_url.store(fail, Ordering::SeqCst);
    }

    /// All completed records, oldest first.
    pub async fn completed(&self) -> Vec<CompletedRecord> {
        self.inner.read().await.completed.clone()
    }

    fn check(&self) -> Result<(), StateError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StateError::Command("mock store failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn ping(&self) -> Result<(), StateError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StateError::ConnectionFailed("mock store offline".to_string()));
        }
        Ok(())
    }

    async fn set_progress(&self, topic: &str, progress: i64) -> Result<(), StateError> {
        self.check()?;
        self.inner
            .write()
            .await
            .processing
            .insert(topic.to_string(), progress);
        Ok(())
    }

    async fn progress(&self, topic: &str) -> Result<Option<i64>, StateError> {
        self.check()?;
        Ok(self.inner.read().await.processing.get(topic).copied())
    }

    async fn remove_processing(&self, topic: &str) -> Result<bool, StateError> {
        self.check()?;
        Ok(self.inner.write().await.processing.remove(topic).is_some())
    }

    async fn processing(&self) -> Result<Vec<ProcessingEntry>, StateError> {
        self.check()?;
        let mut entries: Vec<ProcessingEntry> = self
            .inner
            .read()
            .await
            .processing
            .iter()
            .map(|(name, progress)| ProcessingEntry {
                name: name.clone(),
                progress: *progress,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn set_image_url(&self, topic: &str, image_url: &str) -> Result<(), StateError> {
        self.check()?;
        self.inner
            .write()
            .await
            .image_urls
            .insert(topic.to_string(), image_url.to_string());
        Ok(())
    }

    async fn image_url(&self, topic: &str) -> Result<Option<String>, StateError> {
        self.check()?;
        if self.fail_image_url.load(Ordering::SeqCst) {
            return Err(StateError::Command("mock image URL lookup failure".to_string()));
        }
        Ok(self.inner.read().await.image_urls.get(topic).cloned())
    }

    async fn append_completed(&self, record: &CompletedRecord) -> Result<(), StateError> {
        self.check()?;
        self.inner.write().await.completed.push(record.clone());
        Ok(())
    }

    async fn recent_completed(&self, limit: usize) -> Result<Vec<CompletedRecord>, StateError> {
        self.check()?;
        let inner = self.inner.read().await;
        let start = inner.completed.len().saturating_sub(limit);
        Ok(inner.completed[start..].to_vec())
    }
}
