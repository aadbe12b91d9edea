//! HTTP client for the upscaling engine.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{EngineError, ProcessingEngine};
use crate::metrics::ENGINE_REQUESTS_TOTAL;
use crate::task::TaskDescriptor;

/// Engine reached over HTTP at `{base_url}/create_topic`.
///
/// No request timeout is configured: a hung engine only ties up the
/// spawned dispatch task that awaits it.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    base_url: String,
}

impl HttpEngine {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn submit_url(&self) -> String {
        format!("{}/create_topic", self.base_url)
    }
}

#[async_trait]
impl ProcessingEngine for HttpEngine {
    async fn submit(&self, task: &TaskDescriptor) -> Result<(), EngineError> {
        debug!(topic = %task.topic_name, "Submitting task to engine");

        let response = match self.client.post(self.submit_url()).json(task).send().await {
            Ok(response) => response,
            Err(e) => {
                ENGINE_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
                return Err(e.into());
            }
        };

        let status = response.status();
        if status != StatusCode::CREATED {
            ENGINE_REQUESTS_TOTAL.with_label_values(&["rejected"]).inc();
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        ENGINE_REQUESTS_TOTAL.with_label_values(&["created"]).inc();
        Ok(())
    }
}
