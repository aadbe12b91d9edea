//! Server-Sent Events stream for live viewers.
//!
//! Each connection owns one `ViewerSession`: the greeting comes first, then
//! every relayed progress payload and completion event, with comment frames
//! as heartbeats. Dropping the response body ends the session.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};

use superres_core::{SessionFrame, ViewerSession};

use crate::metrics::{SSE_SESSIONS_ACTIVE, SSE_SESSIONS_TOTAL};
use crate::state::AppState;

/// A session tied to one HTTP response.
struct ConnectedViewer {
    session: ViewerSession,
}

impl ConnectedViewer {
    fn new(session: ViewerSession) -> Self {
        SSE_SESSIONS_ACTIVE.inc();
        SSE_SESSIONS_TOTAL.inc();
        info!(session = %session.id(), "Viewer connected");
        Self { session }
    }
}

impl Drop for ConnectedViewer {
    fn drop(&mut self) {
        SSE_SESSIONS_ACTIVE.dec();
        info!(session = %self.session.id(), "Viewer disconnected");
    }
}

/// GET /events - live viewer stream
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = ViewerSession::start(state.broadcaster(), state.heartbeat_period());
    let viewer = ConnectedViewer::new(session);

    let stream = stream::unfold(viewer, |mut viewer| async move {
        let frame = viewer.session.next_frame().await?;
        let event = match frame {
            SessionFrame::Message(payload) => Event::default().data(sse_data(&payload)),
            SessionFrame::Heartbeat => {
                debug!(session = %viewer.session.id(), "Heartbeat");
                Event::default().comment("heartbeat")
            }
        };
        Some((Ok(event), viewer))
    });

    Sse::new(stream)
}

/// SSE data lines cannot carry carriage returns.
fn sse_data(payload: &str) -> String {
    if payload.contains('\r') {
        payload.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        payload.to_string()
    }
}
