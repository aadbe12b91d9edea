//! Live fan-out of task events to connected viewers.
//!
//! The [`Broadcaster`] keeps one bounded channel per viewer session and
//! delivers each message with `try_send`: a viewer whose buffer is full
//! misses that message, a viewer whose receiver is gone is pruned. A slow
//! viewer never delays the others.

mod session;

pub use session::{SessionFrame, SessionState, ViewerSession};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{BROADCAST_DELIVERED, BROADCAST_DROPPED, BROADCAST_PRUNED};

/// Normalized event pushed to viewers.
///
/// Progress updates are not modelled here; they are relayed as the raw
/// payload the engine published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A task finished.
    Complete {
        topic_id: String,
        #[serde(rename = "imageURL")]
        image_url: String,
        #[serde(rename = "upscaledURL")]
        upscaled_url: String,
    },
    /// Informational notice, e.g. the greeting sent on connect.
    Info { message: String },
}

impl LiveEvent {
    pub fn connected() -> Self {
        LiveEvent::Info {
            message: "connected".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Opaque handle of one viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that accepted the message.
    pub delivered: usize,
    /// Sessions that skipped it because their buffer was full.
    pub dropped: usize,
    /// Sessions removed because their receiver was gone.
    pub pruned: usize,
}

/// Membership map of live viewer sessions.
pub struct Broadcaster {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<String>>>,
    capacity: usize,
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("sessions", &self.session_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Broadcaster {
    /// Create a broadcaster whose sessions buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, mpsc::Sender<String>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session and hand back the receiving end of its channel.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SessionId::new();
        let count = {
            let mut sessions = self.lock();
            sessions.insert(id, tx);
            sessions.len()
        };
        debug!(session = %id, sessions = count, "Viewer session registered");
        (id, rx)
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(session = %id, "Viewer session unregistered");
        }
        removed
    }

    /// Offer `payload` to every session without waiting on any of them.
    pub fn broadcast(&self, payload: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut sessions = self.lock();

        sessions.retain(|id, tx| match tx.try_send(payload.to_string()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(session = %id, "Viewer buffer full, dropping message");
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = %id, "Viewer gone, pruning session");
                report.pruned += 1;
                false
            }
        });
        drop(sessions);

        BROADCAST_DELIVERED.inc_by(report.delivered as u64);
        BROADCAST_DROPPED.inc_by(report.dropped as u64);
        BROADCAST_PRUNED.inc_by(report.pruned as u64);
        report
    }

    /// Serialize and broadcast a normalized event.
    pub fn broadcast_event(&self, event: &LiveEvent) -> BroadcastReport {
        match event.to_json() {
            Ok(json) => self.broadcast(&json),
            Err(e) => {
                warn!("Failed to serialize live event: {}", e);
                BroadcastReport::default()
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(16)
    }
}
