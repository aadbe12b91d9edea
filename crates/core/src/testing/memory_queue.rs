//! In-memory queue for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, RwLock};

use crate::queue::{QueueError, QueueMessage, QueueReader, TaskQueue};

/// In-memory implementation of the TaskQueue trait.
///
/// Published payloads are recorded for assertions and delivered, in order,
/// to the single reader handed out by [`MemoryQueue::take_reader`].
///
/// # Example
///
/// ```rust,ignore
/// let queue = MemoryQueue::new();
/// let mut reader = queue.take_reader().unwrap();
///
/// queue.publish(br#"{"topicName":"a","imageURL":"http://x/a.jpg"}"#).await?;
/// let msg = reader.read_message().await?;
/// ```
#[derive(Debug)]
pub struct MemoryQueue {
    sender: mpsc::UnboundedSender<QueueMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueueMessage>>>,
    published: RwLock<Vec<Vec<u8>>>,
    next_id: AtomicU64,
    fail_publish: AtomicBool,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            published: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_publish: AtomicBool::new(false),
        }
    }

    /// The consumer end. Only the first call returns a reader.
    pub fn take_reader(&self) -> Option<MemoryQueueReader> {
        self.receiver
            .lock()
            .ok()
            .and_then(|mut rx| rx.take())
            .map(|receiver| MemoryQueueReader { receiver })
    }

    /// Every payload published so far.
    pub async fn published(&self) -> Vec<Vec<u8>> {
        self.published.read().await.clone()
    }

    /// Make publishing fail (or succeed again).
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::Publish("mock queue unavailable".to_string()));
        }

        self.published.write().await.push(payload.to_vec());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // the reader may already be gone; the payload stays recorded
        let _ = self.sender.send(QueueMessage {
            id: format!("{}-0", id),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// Reader half of a [`MemoryQueue`].
#[derive(Debug)]
pub struct MemoryQueueReader {
    receiver: mpsc::UnboundedReceiver<QueueMessage>,
}

#[async_trait]
impl QueueReader for MemoryQueueReader {
    async fn read_message(&mut self) -> Result<QueueMessage, QueueError> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| QueueError::Read("queue closed".to_string()))
    }
}
