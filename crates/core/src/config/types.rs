use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Root configuration.
///
/// Every section has an in-cluster default, so an empty file (or no file at
/// all) yields a runnable configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub viewers: ViewerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served as a fallback for non-API paths (dashboard build).
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Origins allowed to call the API from a browser. Empty disables CORS.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5001
}

/// Durable task log configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("super_resolution.db")
}

/// Ephemeral key-value store (processing set, completed list, side lookups).
/// The same server also carries the pub/sub channels.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// How many recent completed records the status query returns.
    #[serde(default = "default_completed_window")]
    pub completed_window: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            completed_window: default_completed_window(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://redis:6379".to_string()
}

fn default_completed_window() -> usize {
    100
}

/// Durable ordered queue (Redis stream consumed through a consumer group).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Consumer name inside the group. Generated per process when unset.
    #[serde(default)]
    pub consumer: Option<String>,
    /// How long a single read blocks waiting for entries (milliseconds).
    /// Keep this below the Redis client's response timeout.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            stream: default_stream(),
            group: default_group(),
            consumer: None,
            block_ms: default_block_ms(),
        }
    }
}

fn default_stream() -> String {
    "media-transcoding".to_string()
}

fn default_group() -> String {
    "transcoding-group".to_string()
}

fn default_block_ms() -> u64 {
    400
}

/// Pub/sub channel names the bridge listens on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    #[serde(default = "default_completion_channel")]
    pub completion_channel: String,
    #[serde(default = "default_progress_channel")]
    pub progress_channel: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            completion_channel: default_completion_channel(),
            progress_channel: default_progress_channel(),
        }
    }
}

fn default_completion_channel() -> String {
    "task_completed".to_string()
}

fn default_progress_channel() -> String {
    "progress_updates".to_string()
}

/// Processing engine endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Base URL; tasks are posted to `{url}/create_topic`.
    #[serde(default = "default_engine_url")]
    pub url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
        }
    }
}

fn default_engine_url() -> String {
    "http://esrgan-engine:7001".to_string()
}

/// Queue consumer switch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    /// When disabled the node only serves the API and never drains the queue.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Live viewer session tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewerConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Per-viewer delivery buffer. Messages beyond it are dropped for that viewer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    16
}
