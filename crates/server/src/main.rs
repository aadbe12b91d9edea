use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use superres_core::{
    load_config, validate_config, Broadcaster, EventBridge, EventBroker, HttpEngine,
    QueueConsumer, RedisEventBroker, RedisStateStore, RedisStreamQueue, RedisStreamReader,
    SqliteTaskLog, StateStore, TaskLog, TaskQueue, TaskRegistry,
};
use superres_server::api::create_router;
use superres_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let json = std::env::var("SUPERRES_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    info!("superres {} starting", VERSION);

    // Config file is optional; defaults and environment cover a cluster deployment
    let config_path = std::env::var("SUPERRES_CONFIG").ok().map(PathBuf::from);
    match &config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No SUPERRES_CONFIG set, using defaults and environment"),
    }

    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Durable task log
    let task_log: Arc<dyn TaskLog> = Arc::new(
        SqliteTaskLog::new(&config.database.path).context("Failed to open task log")?,
    );
    info!("Task log initialized");

    // Ephemeral state store
    let state_store = RedisStateStore::connect(&config.store.url)
        .await
        .context("Failed to connect to state store")?;
    state_store
        .ping()
        .await
        .context("State store did not answer ping")?;
    info!("State store connected at {}", config.store.url);

    let registry = Arc::new(TaskRegistry::new(
        Arc::new(state_store),
        task_log,
        config.store.completed_window,
    ));

    let broadcaster = Arc::new(Broadcaster::new(config.viewers.channel_capacity));
    let mut background = Vec::new();

    // Queue producer for the ingestion endpoint
    let queue: Arc<dyn TaskQueue> = Arc::new(
        RedisStreamQueue::connect(&config.queue)
            .await
            .context("Failed to connect to task queue")?,
    );
    info!("Task queue ready on stream {}", config.queue.stream);

    // Queue consumer
    if config.dispatcher.enabled {
        let reader = RedisStreamReader::connect(&config.queue)
            .await
            .context("Failed to join consumer group")?;
        let engine = Arc::new(
            HttpEngine::new(&config.engine.url).context("Failed to build engine client")?,
        );
        info!(
            "Dispatcher consuming group {} and submitting to {}",
            config.queue.group, config.engine.url
        );
        background.push(
            QueueConsumer::new(Box::new(reader), Arc::clone(&registry), engine).spawn(),
        );
    } else {
        info!("Dispatcher disabled");
    }

    // Completion and progress bridge, on the state store's Redis
    let events: Arc<dyn EventBroker> = Arc::new(
        RedisEventBroker::connect(&config.store.url)
            .await
            .context("Failed to connect to event channels")?,
    );
    let bridge = Arc::new(EventBridge::new(
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
    ));
    background.extend(bridge.spawn(
        events,
        &config.events.completion_channel,
        &config.events.progress_channel,
    ));
    info!(
        "Bridge listening on {} and {}",
        config.events.completion_channel, config.events.progress_channel
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, registry, queue, broadcaster));
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    for handle in background {
        handle.abort();
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
