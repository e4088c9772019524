//! Chat fan-out: the single consumer of the shared inbound queue.
//!
//! Sessions in the chatting phase enqueue accepted chat frames; this task
//! dequeues them one at a time and writes each to every currently bound
//! connection. Frames are forwarded verbatim and in enqueue order. A
//! recipient whose outbound channel is full or closed is skipped — its
//! own session observes the closure independently, so fan-out never
//! performs roster bookkeeping.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::network::connection::OutboundMessage;
use crate::roster::Roster;

/// Drains the chat queue until every producer is gone.
///
/// Runs as one long-lived task next to the connection sessions. The queue
/// is bounded: when it fills, producing sessions wait on enqueue, which
/// is the broker's load shedding.
pub async fn run(mut queue: mpsc::Receiver<String>, roster: Arc<Roster>) {
    while let Some(raw) = queue.recv().await {
        fan_out(&raw, &roster);
    }
    debug!("chat queue closed, broadcaster exiting");
}

/// Writes one frame to every bound connection in the current snapshot.
fn fan_out(raw: &str, roster: &Roster) {
    for handle in roster.snapshot() {
        // Skipped recipients are deliberate: a full channel means a slow
        // socket, a closed one means a dying session.
        if !handle.try_send(OutboundMessage::Frame(raw.to_owned())) {
            debug!(id = handle.id.0, "skipping recipient during fan-out");
        }
    }
}
