//! Bridge from the engine's event channels to the registry and viewers.
//!
//! Completion messages finish tasks in the registry and go out as normalized
//! [`LiveEvent::Complete`] events. Progress messages go out verbatim and are
//! also recorded in the registry when they name a task and a number.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::{Broadcaster, LiveEvent};
use crate::events::{EventBroker, EventError};
use crate::metrics::{BRIDGE_EVENTS_TOTAL, BRIDGE_RESUBSCRIBES_TOTAL};
use crate::registry::TaskRegistry;
use crate::state::parse_progress;

const TOPIC_KEYS: &[&str] = &["topic_id", "topicName", "name"];
const RESULT_KEYS: &[&str] = &["upscaledURL", "result"];
const PROGRESS_TOPIC_KEYS: &[&str] = &["topic", "topic_id", "topicName"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    Completion,
    Progress,
}

impl ChannelKind {
    fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Completion => "completion",
            ChannelKind::Progress => "progress",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct EventBridge {
    registry: Arc<TaskRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl EventBridge {
    pub fn new(registry: Arc<TaskRegistry>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    /// Start one subscribe loop per channel. The loops run until aborted.
    pub fn spawn(
        self: Arc<Self>,
        broker: Arc<dyn EventBroker>,
        completion_channel: &str,
        progress_channel: &str,
    ) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(&self).pump(
                Arc::clone(&broker),
                completion_channel.to_string(),
                ChannelKind::Completion,
            )),
            tokio::spawn(self.pump(broker, progress_channel.to_string(), ChannelKind::Progress)),
        ]
    }

    /// Receive from `channel` forever. Any transport failure, including a
    /// failed subscribe, is logged and retried at once.
    // TODO: capped backoff here; a broker that stays down spins this loop.
    async fn pump(self: Arc<Self>, broker: Arc<dyn EventBroker>, channel: String, kind: ChannelKind) {
        loop {
            let mut subscription = match broker.subscribe(&channel).await {
                Ok(subscription) => {
                    info!("Subscribed to {} channel {}", kind, channel);
                    subscription
                }
                Err(e) => {
                    error!("Subscribe to {} channel {} failed: {}", kind, channel, e);
                    BRIDGE_RESUBSCRIBES_TOTAL
                        .with_label_values(&[kind.as_str()])
                        .inc();
                    tokio::task::yield_now().await;
                    continue;
                }
            };

            loop {
                match subscription.next_message().await {
                    Ok(payload) => match kind {
                        ChannelKind::Completion => {
                            self.handle_completion(&payload).await;
                        }
                        ChannelKind::Progress => self.handle_progress(&payload).await,
                    },
                    Err(EventError::Payload(e)) => {
                        warn!("Skipping unreadable {} message: {}", kind, e);
                    }
                    Err(e) => {
                        error!("Receive on {} channel {} failed: {}", kind, channel, e);
                        break;
                    }
                }
            }

            BRIDGE_RESUBSCRIBES_TOTAL
                .with_label_values(&[kind.as_str()])
                .inc();
            tokio::task::yield_now().await;
        }
    }

    /// Finish the task a completion message names and broadcast the result.
    /// Messages without a correlation id or result URL change nothing and
    /// return `None`.
    pub async fn handle_completion(&self, payload: &str) -> Option<LiveEvent> {
        let Some(fields) = parse_object(payload) else {
            warn!("Dropping unparseable completion message: {}", payload);
            count(ChannelKind::Completion, "dropped");
            return None;
        };

        let (Some(topic), Some(result_url)) = (
            string_field(&fields, TOPIC_KEYS),
            string_field(&fields, RESULT_KEYS),
        ) else {
            warn!("Dropping incomplete completion message: {}", payload);
            count(ChannelKind::Completion, "dropped");
            return None;
        };
        let supplied_image = string_field(&fields, &["imageURL"]);

        let image_url = match self
            .registry
            .complete_task(topic, result_url, supplied_image)
            .await
        {
            Ok(record) => record.image_url,
            Err(e) => {
                error!(topic = %topic, "Failed to record completion: {}", e);
                supplied_image.unwrap_or_default().to_string()
            }
        };

        let event = LiveEvent::Complete {
            topic_id: topic.to_string(),
            image_url,
            upscaled_url: result_url.to_string(),
        };
        let report = self.broadcaster.broadcast_event(&event);
        debug!(topic = %topic, delivered = report.delivered, "Completion broadcast");
        count(ChannelKind::Completion, "relayed");
        Some(event)
    }

    /// Relay a progress message unchanged, then record it in the registry
    /// when it carries a task name and a numeric progress.
    pub async fn handle_progress(&self, payload: &str) {
        let report = self.broadcaster.broadcast(payload);
        debug!(delivered = report.delivered, "Progress relayed");
        count(ChannelKind::Progress, "relayed");

        let Some((topic, progress)) = parse_progress_update(payload) else {
            debug!("Progress message carries no task progress: {}", payload);
            return;
        };
        if let Err(e) = self.registry.update_progress(&topic, progress).await {
            error!(topic = %topic, "Failed to record progress: {}", e);
        }
    }
}

fn count(kind: ChannelKind, result: &str) {
    BRIDGE_EVENTS_TOTAL
        .with_label_values(&[kind.as_str(), result])
        .inc();
}

fn parse_object(payload: &str) -> Option<Map<String, Value>> {
    serde_json::from_str(payload).ok()
}

/// First non-empty string among `keys`.
fn string_field<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

fn parse_progress_update(payload: &str) -> Option<(String, i64)> {
    let fields = parse_object(payload)?;
    let topic = string_field(&fields, PROGRESS_TOPIC_KEYS)?;
    let progress = match fields.get("progress")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?,
        Value::String(s) => parse_progress(s)?,
        _ => return None,
    };
    Some((topic.to_string(), progress))
}
