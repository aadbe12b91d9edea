//! Task types shared by the queue, registry, and HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload carried on the queue and posted to the processing engine.
///
/// Field names follow the wire format (`topicName`, `imageURL`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[serde(rename = "topicName")]
    pub topic_name: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
}

impl TaskDescriptor {
    pub fn new(topic_name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            image_url: image_url.into(),
        }
    }
}

/// Lifecycle position of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskStatus::Queued),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// One upscaling job, keyed by its caller-supplied topic name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    #[serde(rename = "name")]
    pub topic_name: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(rename = "upscaledURL", skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    pub status: TaskStatus,
    /// Live progress, only known while the task sits in the processing set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A task currently in the processing set.
///
/// Progress is whatever the engine last reported; it is neither clamped nor
/// required to increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingEntry {
    pub name: String,
    pub progress: i64,
}

/// Entry appended to the completed set when a task finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub name: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
    #[serde(rename = "upscaledURL", default)]
    pub upscaled_url: String,
    /// Absent on records written by producers that predate the field.
    #[serde(rename = "completedAt", default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Snapshot returned by the status query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub processing: Vec<ProcessingEntry>,
    pub processed: Vec<CompletedRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_uses_wire_field_names() {
        let desc = TaskDescriptor::new("cat-photo", "http://x/cat.jpg");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["topicName"], "cat-photo");
        assert_eq!(json["imageURL"], "http://x/cat.jpg");
    }

    #[test]
    fn test_descriptor_rejects_missing_fields() {
        let result: Result<TaskDescriptor, _> = serde_json::from_str(r#"{"topicName":"a"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_descriptor_ignores_extra_fields() {
        let desc: TaskDescriptor = serde_json::from_str(
            r#"{"topicName":"a","imageURL":"http://x/a.png","priority":3}"#,
        )
        .unwrap();
        assert_eq!(desc.topic_name, "a");
    }

    #[test]
    fn test_status_string_forms() {
        for status in [TaskStatus::Queued, TaskStatus::Processing, TaskStatus::Completed] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("failed"), None);
    }

    #[test]
    fn test_completed_record_tolerates_missing_timestamp() {
        let record: CompletedRecord = serde_json::from_str(
            r#"{"name":"a","imageURL":"http://x/a.png","upscaledURL":"http://x/a-4k.png"}"#,
        )
        .unwrap();
        assert_eq!(record.upscaled_url, "http://x/a-4k.png");
        assert!(record.completed_at.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("completedAt").is_none());
    }
}
