//! WebSocket progress streaming.
//!
//! On connect the client receives a full snapshot of in-progress episodes,
//! then one envelope per pub/sub signal naming episodes whose progress
//! changed. Client frames are ignored except for close. Each receive cycle
//! waits at most the configured poll timeout so server shutdown is observed
//! promptly, and the channel subscription always ends with the session.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::progress::{ProgressTracker, report};
use crate::types::{ProgressEnvelope, ProgressSignal};

use super::AppState;

/// GET /ws
pub(crate) async fn ws_handler(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Outbound half of a progress session
///
/// Seam between the pump loop and the transport, so the loop is testable
/// without a live socket.
#[async_trait]
pub(crate) trait ProgressSink: Send {
    /// Deliver one envelope; `false` ends the session
    async fn send_envelope(&mut self, envelope: &ProgressEnvelope) -> bool;
}

struct SocketSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl ProgressSink for SocketSink {
    async fn send_envelope(&mut self, envelope: &ProgressEnvelope) -> bool {
        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode progress envelope");
                return true;
            }
        };
        self.0.send(Message::Text(payload)).await.is_ok()
    }
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    tracing::debug!("WebSocket client connected");
    let (sink, mut stream) = socket.split();
    let mut sink = SocketSink(sink);

    // Child token: fires on server shutdown or client close
    let cancel = state.cancel.child_token();
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                // Clients only listen; any other frame is ignored
                Ok(_) => {}
            }
        }
        reader_cancel.cancel();
    });

    // Initial snapshot before any signal arrives
    let rx = state.channel.subscribe();
    match report::in_progress_items(&state.db, &state.tracker).await {
        Ok(items) => {
            if !sink
                .send_envelope(&ProgressEnvelope {
                    progress_items: items,
                })
                .await
            {
                cancel.cancel();
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to build initial progress snapshot");
            cancel.cancel();
        }
    }

    pump(
        &state.db,
        &state.tracker,
        rx,
        cancel.clone(),
        state.config.progress.poll_timeout,
        &mut sink,
    )
    .await;

    // Dropping the receiver ends the subscription; the reader follows
    cancel.cancel();
    reader.abort();
    tracing::debug!("WebSocket client disconnected");
}

/// Forward progress signals to the sink until cancellation or disconnect
pub(crate) async fn pump<S: ProgressSink>(
    db: &Database,
    tracker: &ProgressTracker,
    mut rx: broadcast::Receiver<String>,
    cancel: CancellationToken,
    poll_timeout: Duration,
    sink: &mut S,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let raw = match tokio::time::timeout(poll_timeout, rx.recv()).await {
            // Poll tick: nothing arrived, go re-check cancellation
            Err(_) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "Progress subscriber lagged");
                continue;
            }
            Ok(Ok(raw)) => raw,
        };

        let Some(signal) = decode_signal(&raw) else {
            continue;
        };
        match report::items_for_ids(db, tracker, &signal.episode_ids).await {
            Ok(items) => {
                let envelope = ProgressEnvelope {
                    progress_items: items,
                };
                if !sink.send_envelope(&envelope).await {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to build progress items for signal");
            }
        }
    }
}

/// Channel payloads are opaque JSON; anything undecodable is dropped
fn decode_signal(raw: &str) -> Option<ProgressSignal> {
    match serde_json::from_str(raw) {
        Ok(signal) => Some(signal),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed progress message");
            None
        }
    }
}
