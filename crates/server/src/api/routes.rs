use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::warn;

use super::{events, handlers, middleware::metrics_middleware, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Tasks
        .route("/tasks", post(tasks::submit_task))
        .route("/tasks/completed", get(tasks::list_completed))
        .route("/tasks/{topic}", get(tasks::get_task))
        .route("/status", get(tasks::get_status))
        // Live viewers
        .route("/events", get(events::event_stream));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .route_layer(middleware::from_fn(metrics_middleware));

    // Serve the dashboard build for everything else
    if let Some(static_dir) = &state.config().server.static_dir {
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    if let Some(cors) = build_cors_layer(&state.config().server.cors_allowed_origins) {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// CORS layer for the configured origins, `None` when no origin is allowed.
fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE])
            .allow_credentials(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_disabled_without_origins() {
        assert!(build_cors_layer(&[]).is_none());
    }

    #[test]
    fn test_cors_skips_invalid_origins() {
        assert!(build_cors_layer(&["bad\norigin".to_string()]).is_none());
        assert!(build_cors_layer(&[
            "bad\norigin".to_string(),
            "http://localhost:3000".to_string()
        ])
        .is_some());
    }
}
