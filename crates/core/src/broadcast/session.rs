//! Per-viewer session: greeting, relayed messages and heartbeats.
//!
//! A session registers with the broadcaster on start and unregisters when
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::warn;

use super::{Broadcaster, LiveEvent, SessionId};

/// Lifecycle of a viewer session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Closed,
}

/// What the transport should write next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFrame {
    /// A JSON payload.
    Message(String),
    /// Keep-alive with no payload.
    Heartbeat,
}

/// One connected viewer.
///
/// Dropping the session removes it from the broadcaster, so a transport that
/// drops its stream on disconnect needs no further cleanup.
pub struct ViewerSession {
    id: SessionId,
    broadcaster: Arc<Broadcaster>,
    receiver: mpsc::Receiver<String>,
    heartbeat: Interval,
    greeting: Option<String>,
    state: SessionState,
}

impl ViewerSession {
    /// Register with the broadcaster. The first frame is the connect greeting;
    /// heartbeats start one period after this call.
    pub fn start(broadcaster: Arc<Broadcaster>, heartbeat_period: Duration) -> Self {
        let (id, receiver) = broadcaster.register();

        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let greeting = match LiveEvent::connected().to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(session = %id, "Failed to encode greeting: {}", e);
                None
            }
        };

        Self {
            id,
            broadcaster,
            receiver,
            heartbeat,
            greeting,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait for the next frame: a broadcast message or a heartbeat, whichever
    /// comes first. Returns `None` once the session is closed, including when
    /// the broadcaster pruned it.
    pub async fn next_frame(&mut self) -> Option<SessionFrame> {
        match self.state {
            SessionState::Closed => return None,
            SessionState::Connecting => {
                self.state = SessionState::Streaming;
                if let Some(greeting) = self.greeting.take() {
                    return Some(SessionFrame::Message(greeting));
                }
            }
            SessionState::Streaming => {}
        }

        tokio::select! {
            msg = self.receiver.recv() => match msg {
                Some(payload) => Some(SessionFrame::Message(payload)),
                None => {
                    self.close();
                    None
                }
            },
            _ = self.heartbeat.tick() => Some(SessionFrame::Heartbeat),
        }
    }

    /// Leave the broadcaster. Further frames are `None`.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.broadcaster.unregister(self.id);
        self.receiver.close();
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.close();
    }
}
