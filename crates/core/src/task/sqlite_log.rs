//! SQLite-backed task log implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Task, TaskLog, TaskLogError, TaskStatus};

/// SQLite-backed task log.
pub struct SqliteTaskLog {
    conn: Mutex<Connection>,
}

impl SqliteTaskLog {
    /// Open (or create) the database file and its table.
    pub fn new(path: &Path) -> Result<Self, TaskLogError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory task log (useful for testing).
    pub fn in_memory() -> Result<Self, TaskLogError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskLogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS super_resolution_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_name TEXT UNIQUE NOT NULL,
                image_url TEXT NOT NULL,
                upscaled_url TEXT,
                status TEXT NOT NULL DEFAULT 'queued',
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sr_tasks_status ON super_resolution_tasks(status);
            CREATE INDEX IF NOT EXISTS idx_sr_tasks_completed_at ON super_resolution_tasks(completed_at);
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let topic_name: String = row.get(0)?;
        let image_url: String = row.get(1)?;
        let result_url: Option<String> = row.get(2)?;
        let status_str: String = row.get(3)?;
        let created_at_str: String = row.get(4)?;
        let completed_at_str: Option<String> = row.get(5)?;

        // Rows written by other services may carry unknown statuses; a result URL
        // is the strongest signal that the task finished.
        let status = TaskStatus::parse(&status_str).unwrap_or(if result_url.is_some() {
            TaskStatus::Completed
        } else {
            TaskStatus::Queued
        });

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let completed_at = completed_at_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Task {
            topic_name,
            image_url,
            result_url,
            status,
            progress: None,
            created_at,
            completed_at,
        })
    }
}

impl TaskLog for SqliteTaskLog {
    fn insert_queued(&self, topic: &str, image_url: &str) -> Result<bool, TaskLogError> {
        let conn = self.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO super_resolution_tasks (topic_name, image_url, status, created_at) VALUES (?, ?, ?, ?)",
                params![
                    topic,
                    image_url,
                    TaskStatus::Queued.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    fn mark_processing(&self, topic: &str) -> Result<bool, TaskLogError> {
        let conn = self.lock();
        let updated = conn
            .execute(
                "UPDATE super_resolution_tasks SET status = ? WHERE topic_name = ? AND status = ?",
                params![
                    TaskStatus::Processing.as_str(),
                    topic,
                    TaskStatus::Queued.as_str()
                ],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    fn mark_completed(
        &self,
        topic: &str,
        image_url: &str,
        result_url: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), TaskLogError> {
        let conn = self.lock();
        let completed_at = completed_at.to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO super_resolution_tasks (topic_name, image_url, upscaled_url, status, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(topic_name) DO UPDATE SET
                upscaled_url = excluded.upscaled_url,
                status = excluded.status,
                completed_at = excluded.completed_at
            "#,
            params![
                topic,
                image_url,
                result_url,
                TaskStatus::Completed.as_str(),
                completed_at
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get(&self, topic: &str) -> Result<Option<Task>, TaskLogError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT topic_name, image_url, upscaled_url, status, created_at, completed_at FROM super_resolution_tasks WHERE topic_name = ?",
            params![topic],
            Self::row_to_task,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_completed(&self, limit: usize) -> Result<Vec<Task>, TaskLogError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT topic_name, image_url, upscaled_url, status, created_at, completed_at FROM super_resolution_tasks WHERE status = ? ORDER BY completed_at DESC, id DESC LIMIT ?",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![TaskStatus::Completed.as_str(), limit as i64],
                Self::row_to_task,
            )
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> TaskLogError {
    TaskLogError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_log() -> SqliteTaskLog {
        SqliteTaskLog::in_memory().expect("Failed to create in-memory log")
    }

    #[test]
    fn test_insert_queued_and_get() {
        let log = create_log();
        assert!(log.insert_queued("cat-photo", "http://x/cat.jpg").unwrap());

        let task = log.get("cat-photo").unwrap().expect("task should exist");
        assert_eq!(task.topic_name, "cat-photo");
        assert_eq!(task.image_url, "http://x/cat.jpg");
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.result_url.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let log = create_log();
        assert!(log.insert_queued("dup", "http://x/first.jpg").unwrap());
        assert!(!log.insert_queued("dup", "http://x/second.jpg").unwrap());

        let task = log.get("dup").unwrap().unwrap();
        assert_eq!(task.image_url, "http://x/first.jpg");
    }

    #[test]
    fn test_get_missing_returns_none() {
        let log = create_log();
        assert!(log.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_mark_processing_only_moves_queued_rows() {
        let log = create_log();
        assert!(!log.mark_processing("unknown").unwrap());

        log.insert_queued("t", "http://x/t.jpg").unwrap();
        assert!(log.mark_processing("t").unwrap());
        assert_eq!(log.get("t").unwrap().unwrap().status, TaskStatus::Processing);

        log.mark_completed("t", "http://x/t.jpg", "http://x/t-4k.jpg", Utc::now())
            .unwrap();
        assert!(!log.mark_processing("t").unwrap());
        assert_eq!(log.get("t").unwrap().unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_mark_completed_updates_existing_row() {
        let log = create_log();
        log.insert_queued("t", "http://x/t.jpg").unwrap();
        let created = log.get("t").unwrap().unwrap().created_at;

        log.mark_completed("t", "", "http://x/t-4k.jpg", Utc::now())
            .unwrap();

        let task = log.get("t").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_url.as_deref(), Some("http://x/t-4k.jpg"));
        // the original image URL survives an empty backfill
        assert_eq!(task.image_url, "http://x/t.jpg");
        assert_eq!(task.created_at, created);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_mark_completed_creates_unknown_task() {
        let log = create_log();
        log.mark_completed("late", "http://x/late.jpg", "http://x/late-4k.jpg", Utc::now())
            .unwrap();

        let task = log.get("late").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.image_url, "http://x/late.jpg");
    }

    #[test]
    fn test_list_completed_newest_first_with_limit() {
        let log = create_log();
        let base = Utc::now();
        for i in 0..5 {
            let topic = format!("t-{}", i);
            log.insert_queued(&topic, "http://x/in.jpg").unwrap();
            log.mark_completed(&topic, "", "http://x/out.jpg", base + Duration::seconds(i))
                .unwrap();
        }
        log.insert_queued("still-queued", "http://x/q.jpg").unwrap();

        let completed = log.list_completed(3).unwrap();
        let names: Vec<_> = completed.iter().map(|t| t.topic_name.as_str()).collect();
        assert_eq!(names, vec!["t-4", "t-3", "t-2"]);
    }

    #[test]
    fn test_file_backed_log_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.db");
        {
            let log = SqliteTaskLog::new(&path).unwrap();
            log.insert_queued("persisted", "http://x/p.jpg").unwrap();
        }
        let reopened = SqliteTaskLog::new(&path).unwrap();
        assert!(reopened.get("persisted").unwrap().is_some());
    }
}
