//! Queue consumer: drains task descriptors and hands them to the engine.
//!
//! Each message is registered as processing and then submitted from its own
//! spawned task, so a slow or hung engine never holds up the next read.
//! Engine failures are logged only; the task stays in the processing set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::ProcessingEngine;
use crate::metrics::{ENGINE_REQUEST_DURATION, QUEUE_MESSAGES_TOTAL};
use crate::queue::{QueueMessage, QueueReader};
use crate::registry::TaskRegistry;
use crate::task::TaskDescriptor;

/// Pause after a failed read before trying again.
const READ_ERROR_PAUSE: Duration = Duration::from_secs(1);

pub struct QueueConsumer {
    reader: Box<dyn QueueReader>,
    registry: Arc<TaskRegistry>,
    engine: Arc<dyn ProcessingEngine>,
}

impl QueueConsumer {
    pub fn new(
        reader: Box<dyn QueueReader>,
        registry: Arc<TaskRegistry>,
        engine: Arc<dyn ProcessingEngine>,
    ) -> Self {
        Self {
            reader,
            registry,
            engine,
        }
    }

    /// Run the read loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Read forever. Read errors are logged and the loop continues.
    pub async fn run(mut self) {
        info!("Queue consumer started");
        loop {
            match self.reader.read_message().await {
                Ok(message) => {
                    self.process_message(&message).await;
                }
                Err(e) => {
                    QUEUE_MESSAGES_TOTAL.with_label_values(&["read_error"]).inc();
                    error!("Queue read failed: {}", e);
                    tokio::time::sleep(READ_ERROR_PAUSE).await;
                }
            }
        }
    }

    /// Handle one message. Returns the handle of the spawned engine call, or
    /// `None` if the payload was dropped or names an already completed task.
    pub async fn process_message(&self, message: &QueueMessage) -> Option<JoinHandle<()>> {
        let task: TaskDescriptor = match serde_json::from_slice(&message.payload) {
            Ok(task) => task,
            Err(e) => {
                QUEUE_MESSAGES_TOTAL.with_label_values(&["malformed"]).inc();
                warn!(id = %message.id, "Dropping unreadable queue message: {}", e);
                return None;
            }
        };

        debug!(id = %message.id, topic = %task.topic_name, "Received task");

        match self
            .registry
            .register_processing(&task.topic_name, &task.image_url)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                QUEUE_MESSAGES_TOTAL.with_label_values(&["completed"]).inc();
                info!(id = %message.id, topic = %task.topic_name, "Skipping already completed task");
                return None;
            }
            Err(e) => {
                error!(topic = %task.topic_name, "Failed to register task as processing: {}", e);
            }
        }

        QUEUE_MESSAGES_TOTAL.with_label_values(&["dispatched"]).inc();
        let engine = Arc::clone(&self.engine);
        Some(tokio::spawn(submit(engine, task)))
    }
}

async fn submit(engine: Arc<dyn ProcessingEngine>, task: TaskDescriptor) {
    let started = Instant::now();
    match engine.submit(&task).await {
        Ok(()) => {
            ENGINE_REQUEST_DURATION
                .with_label_values(&["success"])
                .observe(started.elapsed().as_secs_f64());
            info!(topic = %task.topic_name, "Task accepted by engine");
        }
        Err(e) => {
            ENGINE_REQUEST_DURATION
                .with_label_values(&["failure"])
                .observe(started.elapsed().as_secs_f64());
            error!(topic = %task.topic_name, "Engine call failed: {}", e);
        }
    }
}
