pub mod bridge;
pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod state;
pub mod task;
pub mod testing;

pub use bridge::EventBridge;
pub use broadcast::{
    BroadcastReport, Broadcaster, LiveEvent, SessionFrame, SessionId, SessionState, ViewerSession,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    DispatcherConfig, EngineConfig, EventsConfig, QueueConfig, ServerConfig, StoreConfig,
    ViewerConfig,
};
pub use dispatcher::QueueConsumer;
pub use engine::{EngineError, HttpEngine, ProcessingEngine};
pub use events::{EventBroker, EventError, EventSubscription, RedisEventBroker};
pub use queue::{
    QueueError, QueueMessage, QueueReader, RedisStreamQueue, RedisStreamReader, TaskQueue,
};
pub use registry::{RegistryError, TaskRegistry, MAX_HISTORY};
pub use state::{RedisStateStore, StateError, StateStore};
pub use task::{
    CompletedRecord, ProcessingEntry, SqliteTaskLog, StatusSnapshot, Task, TaskDescriptor,
    TaskLog, TaskLogError, TaskStatus,
};
