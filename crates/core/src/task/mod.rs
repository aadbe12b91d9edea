//! Task records: wire payloads, status, and the durable task log.

mod log;
mod sqlite_log;
mod types;

pub use log::{TaskLog, TaskLogError};
pub use sqlite_log::SqliteTaskLog;
pub use types::{CompletedRecord, ProcessingEntry, StatusSnapshot, Task, TaskDescriptor, TaskStatus};
