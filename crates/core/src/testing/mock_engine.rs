//! Mock processing engine for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::engine::{EngineError, ProcessingEngine};
use crate::task::TaskDescriptor;

/// Mock implementation of the ProcessingEngine trait.
///
/// Provides controllable behavior for testing:
/// - Record submitted tasks for assertions
/// - Reject submissions
/// - Hang forever to simulate a stuck engine
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    submitted: Arc<RwLock<Vec<TaskDescriptor>>>,
    reject: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer submissions with a non-created status.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Never answer submissions.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Tasks received so far, in arrival order.
    pub async fn submitted(&self) -> Vec<TaskDescriptor> {
        self.submitted.read().await.clone()
    }

    /// Wait until at least `count` tasks were received, or `timeout` passes.
    pub async fn wait_for_submissions(&self, count: usize, timeout: Duration) -> Vec<TaskDescriptor> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let submitted = self.submitted().await;
            if submitted.len() >= count || tokio::time::Instant::now() >= deadline {
                return submitted;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ProcessingEngine for MockEngine {
    async fn submit(&self, task: &TaskDescriptor) -> Result<(), EngineError> {
        self.submitted.write().await.push(task.clone());

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected {
                status: 500,
                message: "mock engine rejected task".to_string(),
            });
        }
        Ok(())
    }
}
