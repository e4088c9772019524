//! WebSocket upgrade handler and per-socket plumbing.
//!
//! The upgraded socket is split three ways: a write loop drains the
//! connection's bounded outbound channel into the sink, a read loop
//! forwards complete text messages into an inbound channel, and the
//! session state machine consumes that channel. Dropping the inbound
//! sender is how socket closure reaches the session: every suspension
//! point sees it as `recv() -> None`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::AppState;
use crate::network::connection::{ConnectionHandle, ConnectionId, OutboundMessage};
use crate::network::session::Session;

/// Messages buffered from the socket toward the session. Small on
/// purpose: a flooding client blocks its own reader, not the broker.
const INBOUND_BUFFER: usize = 32;

/// Upgrades an HTTP connection and hands the socket to a session.
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one client connection for its entire lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = ConnectionId(state.next_connection_id.fetch_add(1, Ordering::Relaxed));
    debug!(id = id.0, "socket accepted");

    let (sink, stream) = socket.split();
    let (handle, outbound_rx) =
        ConnectionHandle::channel(id, state.config.connection.outbound_channel_capacity);
    let handle = Arc::new(handle);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

    let writer = tokio::spawn(write_loop(sink, outbound_rx));
    let reader = tokio::spawn(read_loop(stream, inbound_tx));

    Session::new(
        id,
        Arc::clone(&handle),
        inbound_rx,
        Arc::clone(&state.roster),
        state.chat_queue.clone(),
        state.config.session.clone(),
        state.config.connection.send_timeout,
        state.shutdown.subscribe(),
    )
    .run()
    .await;

    // The session has finished its bookkeeping. Stop reading (the socket
    // may still be open after a server-initiated disconnect) and let the
    // writer flush what is queued, ending with the close frame.
    reader.abort();
    drop(handle);
    let _ = writer.await;
    debug!(id = id.0, "socket torn down");
}

/// Drains the outbound channel into the socket sink.
///
/// Exits on the explicit close marker, on a failed write, or when every
/// sender is gone.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        match msg {
            OutboundMessage::Frame(text) => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            OutboundMessage::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Forwards complete text messages to the session.
///
/// Ends on a close frame, a transport error, or the session going away;
/// dropping `inbound` is the closure signal the session acts on. Binary
/// and control frames are not part of the protocol and are ignored.
async fn read_loop(mut stream: SplitStream<WebSocket>, inbound: mpsc::Sender<String>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if inbound.send(text.as_str().to_owned()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}
