//! Testing utilities and in-memory implementations for E2E tests.
//!
//! This module provides stand-ins for every external service trait, allowing
//! the full task lifecycle to run without Redis or a processing engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use superres_core::testing::{MemoryEventBroker, MemoryQueue, MemoryStateStore, MockEngine};
//!
//! let state = Arc::new(MemoryStateStore::new());
//! let queue = Arc::new(MemoryQueue::new());
//! let events = Arc::new(MemoryEventBroker::new());
//! let engine = Arc::new(MockEngine::new());
//!
//! // Simulate the engine finishing a task
//! events.publish("task_completed", r#"{"topic_id":"a","upscaledURL":"http://x/a-4k.jpg"}"#).await?;
//! ```

mod memory_events;
mod memory_queue;
mod memory_state;
mod mock_engine;

pub use memory_events::MemoryEventBroker;
pub use memory_queue::{MemoryQueue, MemoryQueueReader};
pub use memory_state::MemoryStateStore;
pub use mock_engine::MockEngine;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::task::TaskDescriptor;

    /// Queue payload for a task, as a producer would publish it.
    pub fn task_payload(topic: &str, image_url: &str) -> Vec<u8> {
        serde_json::to_vec(&TaskDescriptor::new(topic, image_url)).unwrap_or_default()
    }

    /// Completion message as the engine publishes it.
    pub fn completion_message(topic: &str, upscaled_url: &str) -> String {
        serde_json::json!({
            "topic_id": topic,
            "upscaledURL": upscaled_url,
        })
        .to_string()
    }

    /// Progress message as the engine publishes it.
    pub fn progress_message(topic: &str, progress: i64) -> String {
        serde_json::json!({
            "topic": topic,
            "progress": progress,
        })
        .to_string()
    }
}
