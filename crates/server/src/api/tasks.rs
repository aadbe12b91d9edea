//! Task ingestion and query handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use superres_core::{StatusSnapshot, Task, TaskDescriptor, MAX_HISTORY};

use super::handlers::ErrorResponse;
use crate::metrics::TASKS_SUBMITTED_TOTAL;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a task
#[derive(Debug, Deserialize)]
pub struct SubmitTaskBody {
    #[serde(rename = "topicName", default)]
    pub topic_name: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
}

/// Response for an accepted submission
#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub message: String,
    #[serde(rename = "topicName")]
    pub topic_name: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
}

/// Query parameters for the completed history
#[derive(Debug, Deserialize)]
pub struct ListCompletedParams {
    pub limit: Option<usize>,
}

/// Response for the completed history
#[derive(Debug, Serialize)]
pub struct ListCompletedResponse {
    pub tasks: Vec<Task>,
    pub limit: usize,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a task for upscaling.
///
/// The durable record is written before the payload is published, so a task
/// that reaches the queue is always known to the log.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitTaskBody>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), impl IntoResponse> {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            TASKS_SUBMITTED_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(error_response(StatusCode::BAD_REQUEST, rejection.body_text()));
        }
    };

    if body.topic_name.is_empty() || body.image_url.is_empty() {
        TASKS_SUBMITTED_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Both topicName and imageURL are required",
        ));
    }

    let descriptor = TaskDescriptor::new(body.topic_name, body.image_url);

    let inserted = match state.registry().register_queued(&descriptor) {
        Ok(inserted) => inserted,
        Err(e) => {
            error!(topic = %descriptor.topic_name, "Failed to record task: {}", e);
            TASKS_SUBMITTED_TOTAL.with_label_values(&["failed"]).inc();
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };
    if !inserted {
        warn!(topic = %descriptor.topic_name, "Topic already recorded, publishing again");
    }

    let payload = match serde_json::to_vec(&descriptor) {
        Ok(payload) => payload,
        Err(e) => {
            TASKS_SUBMITTED_TOTAL.with_label_values(&["failed"]).inc();
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if let Err(e) = state.queue().publish(&payload).await {
        error!(topic = %descriptor.topic_name, "Failed to publish task: {}", e);
        TASKS_SUBMITTED_TOTAL.with_label_values(&["failed"]).inc();
        return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
    }

    let result = if inserted { "queued" } else { "duplicate" };
    TASKS_SUBMITTED_TOTAL.with_label_values(&[result]).inc();
    info!(topic = %descriptor.topic_name, "Task queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            message: "Task submitted".to_string(),
            topic_name: descriptor.topic_name,
            image_url: descriptor.image_url,
        }),
    ))
}

/// Processing set and recent completions
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, impl IntoResponse> {
    state
        .registry()
        .list_status()
        .await
        .map(Json)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Completed history from the durable log, newest first
pub async fn list_completed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListCompletedParams>,
) -> Result<Json<ListCompletedResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(MAX_HISTORY).clamp(1, MAX_HISTORY);

    match state.registry().completed_history(limit) {
        Ok(tasks) => Ok(Json(ListCompletedResponse { tasks, limit })),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Get a task by topic name
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Result<Json<Task>, impl IntoResponse> {
    match state.registry().task(&topic).await {
        Ok(Some(task)) => Ok(Json(task)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Task not found: {}", topic),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
