//! Common test utilities for E2E testing with in-memory doubles.
//!
//! This module provides a test fixture that creates an in-process server
//! wired exactly like the binary, but with the queue, state store, event
//! channels, and processing engine replaced by in-memory doubles.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use superres_core::{
    testing::{MemoryEventBroker, MemoryQueue, MemoryStateStore, MockEngine},
    Broadcaster, Config, DatabaseConfig, EventBridge, EventBroker, QueueConsumer, SqliteTaskLog,
    TaskRegistry, TaskStatus,
};
use superres_server::state::AppState;

/// Re-export fixtures for test convenience
pub use superres_core::testing::fixtures;

pub const COMPLETION: &str = "task_completed";
pub const PROGRESS: &str = "progress_updates";
pub const WAIT: Duration = Duration::from_secs(5);

/// Test fixture for E2E testing with in-memory dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/tasks", json!({
///         "topicName": "cat-photo",
///         "imageURL": "http://x/cat.jpg"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub registry: Arc<TaskRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    /// Queue double - inspect published payloads, inject failures
    pub queue: Arc<MemoryQueue>,
    /// Event channel double - publish completions and progress
    pub events: Arc<MemoryEventBroker>,
    /// State store double - inject failures
    pub state: Arc<MemoryStateStore>,
    /// Engine double - inspect submissions
    pub engine: MockEngine,
    handles: Vec<JoinHandle<()>>,
    /// Temporary directory for the task log
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Options for the fixture
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Run the queue consumer against the mock engine
    pub enable_dispatcher: bool,
    pub heartbeat_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            enable_dispatcher: true,
            heartbeat_secs: 3600,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default options.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom options.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };
        config.viewers.heartbeat_secs = test_config.heartbeat_secs;
        config.dispatcher.enabled = test_config.enable_dispatcher;

        let state = Arc::new(MemoryStateStore::new());
        let log = Arc::new(SqliteTaskLog::new(&db_path).expect("Failed to create task log"));
        let registry = Arc::new(TaskRegistry::new(
            Arc::clone(&state) as _,
            log,
            config.store.completed_window,
        ));
        let broadcaster = Arc::new(Broadcaster::new(config.viewers.channel_capacity));
        let queue = Arc::new(MemoryQueue::new());
        let events = Arc::new(MemoryEventBroker::new());
        let engine = MockEngine::new();

        let mut handles = Vec::new();
        if config.dispatcher.enabled {
            let reader = queue.take_reader().expect("reader already taken");
            handles.push(
                QueueConsumer::new(
                    Box::new(reader),
                    Arc::clone(&registry),
                    Arc::new(engine.clone()),
                )
                .spawn(),
            );
        }

        let bridge = Arc::new(EventBridge::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
        ));
        handles.extend(bridge.spawn(
            Arc::clone(&events) as Arc<dyn EventBroker>,
            COMPLETION,
            PROGRESS,
        ));
        events.wait_for_subscribers(COMPLETION, 1).await;
        events.wait_for_subscribers(PROGRESS, 1).await;

        let app_state = Arc::new(AppState::new(
            config,
            Arc::clone(&registry),
            Arc::clone(&queue) as _,
            Arc::clone(&broadcaster),
        ));
        let router = superres_server::api::create_router(app_state);

        Self {
            router,
            registry,
            broadcaster,
            queue,
            events,
            state,
            engine,
            handles,
            temp_dir,
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        self.request(request).await
    }

    /// Make a POST request with JSON body
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();

        self.request(request).await
    }

    /// Make a POST request with a raw body
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.request(request).await
    }

    /// Make a GET request and return the raw text body
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    /// Execute a request and parse the JSON response
    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::String(
                String::from_utf8_lossy(&body).to_string(),
            ))
        };

        TestResponse { status, body }
    }

    /// Wait until a topic is in the processing set and its durable record
    /// says so
    pub async fn wait_for_processing(&self, topic: &str) {
        tokio::time::timeout(WAIT, async {
            loop {
                let task = self.registry.task(topic).await.unwrap();
                if task.is_some_and(|t| t.status == TaskStatus::Processing && t.progress.is_some()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task never reached processing");
    }

    /// Wait until the durable record of a topic is marked completed
    pub async fn wait_for_completed(&self, topic: &str) {
        tokio::time::timeout(WAIT, async {
            loop {
                let task = self.registry.task(topic).await.unwrap();
                if task.is_some_and(|t| t.status == TaskStatus::Completed) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task never completed");
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
