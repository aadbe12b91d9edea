//! In-memory event broker for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::events::{EventBroker, EventError, EventSubscription};

const CHANNEL_CAPACITY: usize = 256;

/// In-memory implementation of the EventBroker trait.
///
/// Like Redis pub/sub, messages published while nobody is subscribed are
/// lost. [`MemoryEventBroker::disconnect_all`] closes every open
/// subscription to simulate a transport failure.
#[derive(Debug, Default)]
pub struct MemoryEventBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    subscribe_calls: AtomicUsize,
}

impl MemoryEventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Total number of subscribe calls made.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Close every open subscription.
    pub fn disconnect_all(&self) {
        self.lock().clear();
    }

    /// Wait until `channel` has at least `count` subscribers.
    pub async fn wait_for_subscribers(&self, channel: &str, count: usize) {
        while self.subscriber_count(channel) < count {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl EventBroker for MemoryEventBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn EventSubscription>, EventError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let receiver = self
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Ok(Box::new(MemorySubscription { receiver }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), EventError> {
        if let Some(tx) = self.lock().get(channel) {
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }
}

struct MemorySubscription {
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl EventSubscription for MemorySubscription {
    async fn next_message(&mut self) -> Result<String, EventError> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(EventError::Closed),
            }
        }
    }
}
