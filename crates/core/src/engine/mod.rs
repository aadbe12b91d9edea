//! Processing engine client.
//!
//! The engine accepts a task descriptor and later reports completion and
//! progress over the event channels; the submit call itself only confirms
//! that the engine took the task.

mod http;

pub use http::HttpEngine;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::TaskDescriptor;

#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP request failed before a response arrived.
    #[error("Engine request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Engine answered with something other than "created".
    #[error("Engine rejected task with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait ProcessingEngine: Send + Sync {
    /// Hand a task to the engine.
    async fn submit(&self, task: &TaskDescriptor) -> Result<(), EngineError>;
}
