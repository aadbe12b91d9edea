use std::sync::Arc;
use std::time::Duration;

use superres_core::{Broadcaster, Config, TaskQueue, TaskRegistry};

/// Shared application state
pub struct AppState {
    config: Config,
    registry: Arc<TaskRegistry>,
    queue: Arc<dyn TaskQueue>,
    broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<TaskRegistry>,
        queue: Arc<dyn TaskQueue>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            config,
            registry,
            queue,
            broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.registry.as_ref()
    }

    pub fn queue(&self) -> &dyn TaskQueue {
        self.queue.as_ref()
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.config.viewers.heartbeat_secs)
    }
}
