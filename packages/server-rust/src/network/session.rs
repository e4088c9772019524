//! Per-client session lifecycle.
//!
//! One session runs per accepted socket, from admission to teardown. The
//! session is the sole writer of roster entries for its own connection.
//! The accounting invariant: every successful admission is balanced by
//! exactly one `release` (leaving the naming phase) or one `unbind`
//! (leaving the chatting phase), on every exit path — timeout, protocol
//! error, orderly exit, socket closure, or server shutdown. Whether the
//! closing `DISCONNECT` can still be delivered never changes that.
//!
//! Two timeout disciplines coexist. While a client is choosing a name the
//! budget is cumulative: every received message consumes wall-clock time
//! from a fixed allowance, and a rejected name does not refill it. Once
//! named, the budget is per-message: each received message re-arms the
//! full idle allowance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};
use tracing::debug;

use tmp_core::{Frame, FrameKind, Origin};

use super::config::SessionConfig;
use super::connection::{ConnectionHandle, ConnectionId, OutboundMessage};
use super::shutdown::Lifecycle;
use crate::roster::{BindError, Roster};

/// Lifecycle phase of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Socket accepted, admission not yet decided.
    Init,
    /// Admitted; waiting for a unique display name.
    AwaitingName,
    /// Name bound; chat frames flow to the broadcaster.
    Chatting,
    /// Terminal. The socket is closed once this phase is reached.
    Closed,
}

/// What a suspension point produced.
enum RecvOutcome {
    /// One complete text message from the client.
    Message(String),
    /// The socket closed; nothing can be sent anymore.
    SocketClosed,
    /// The phase's idle budget ran out.
    TimedOut,
    /// The server is shutting down.
    Shutdown,
}

/// One client's connection lifecycle, from admission to teardown.
pub struct Session {
    id: ConnectionId,
    handle: Arc<ConnectionHandle>,
    inbound: mpsc::Receiver<String>,
    roster: Arc<Roster>,
    chat_queue: mpsc::Sender<String>,
    config: SessionConfig,
    send_timeout: Duration,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl Session {
    /// Assembles a session over an already-accepted connection.
    ///
    /// `inbound` must yield one complete text message per recv and close
    /// when the socket does; `handle` must reach the connection's write
    /// loop. The wiring lives in the WebSocket handler.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ConnectionId,
        handle: Arc<ConnectionHandle>,
        inbound: mpsc::Receiver<String>,
        roster: Arc<Roster>,
        chat_queue: mpsc::Sender<String>,
        config: SessionConfig,
        send_timeout: Duration,
        lifecycle: watch::Receiver<Lifecycle>,
    ) -> Self {
        Self {
            id,
            handle,
            inbound,
            roster,
            chat_queue,
            config,
            send_timeout,
            lifecycle,
        }
    }

    /// Runs the lifecycle to completion, then closes the socket.
    pub async fn run(mut self) {
        let mut phase = Phase::Init;
        loop {
            phase = match phase {
                Phase::Init => self.admit().await,
                Phase::AwaitingName => self.await_name().await,
                Phase::Chatting => self.chat().await,
                Phase::Closed => break,
            };
        }
        let _ = self.handle.try_send(OutboundMessage::Close);
        debug!(id = self.id.0, "session closed");
    }

    /// Admission: one capacity check, taken atomically with the occupancy
    /// increment. Admitted clients are never evicted to make room.
    async fn admit(&mut self) -> Phase {
        if !self.roster.try_admit() {
            debug!(id = self.id.0, "admission refused, server full");
            self.send_frame(&Frame::disconnect()).await;
            return Phase::Closed;
        }
        self.send_frame(&Frame::state_upg_1()).await;
        Phase::AwaitingName
    }

    /// Naming phase: a fixed cumulative budget to produce a unique name.
    async fn await_name(&mut self) -> Phase {
        let budget = self.config.name_timeout;
        let mut spent = Duration::ZERO;
        loop {
            let started = Instant::now();
            let outcome = self.next_message(budget.saturating_sub(spent)).await;
            spent += started.elapsed();
            match outcome {
                RecvOutcome::TimedOut => {
                    self.roster.release();
                    self.send_frame(&Frame::disconnect()).await;
                    return Phase::Closed;
                }
                RecvOutcome::SocketClosed => {
                    self.roster.release();
                    return Phase::Closed;
                }
                RecvOutcome::Shutdown => {
                    self.roster.release();
                    self.send_frame(&Frame::disconnect()).await;
                    return Phase::Closed;
                }
                RecvOutcome::Message(raw) => match Frame::parse(&raw, Origin::Client) {
                    Ok(frame) if frame.kind() == FrameKind::SetUsr => {
                        let Some(name) = frame.name() else {
                            // Unreachable: SET_USR cannot parse without a
                            // name. Treat as a protocol error regardless.
                            self.roster.release();
                            self.send_frame(&Frame::disconnect()).await;
                            return Phase::Closed;
                        };
                        match self.roster.bind(self.id, name, Arc::clone(&self.handle)) {
                            Ok(()) => {
                                debug!(id = self.id.0, name, "name registered");
                                self.send_named_reply(FrameKind::StateUpg2, name).await;
                                return Phase::Chatting;
                            }
                            Err(BindError::NameTaken { .. }) => {
                                // The clock keeps running against the same
                                // budget; the client may try another name.
                                self.send_named_reply(FrameKind::SetUsrConflict, name)
                                    .await;
                            }
                            Err(err @ BindError::AlreadyBound { .. }) => {
                                debug!(id = self.id.0, %err, "refusing rebind");
                                self.roster.release();
                                self.send_frame(&Frame::disconnect()).await;
                                return Phase::Closed;
                            }
                        }
                    }
                    Ok(frame) if frame.kind() == FrameKind::ExitChat => {
                        self.roster.release();
                        self.send_frame(&Frame::disconnect()).await;
                        return Phase::Closed;
                    }
                    Ok(frame) => {
                        self.disconnect_unnamed_on_protocol_error(&format!(
                            "unexpected {} before a name was set",
                            frame.kind()
                        ))
                        .await;
                        return Phase::Closed;
                    }
                    Err(err) => {
                        self.disconnect_unnamed_on_protocol_error(&err.to_string())
                            .await;
                        return Phase::Closed;
                    }
                },
            }
        }
    }

    /// Chatting phase: forward chat frames, idle budget re-armed per recv.
    async fn chat(&mut self) -> Phase {
        loop {
            match self.next_message(self.config.idle_timeout).await {
                RecvOutcome::TimedOut | RecvOutcome::Shutdown => {
                    self.roster.unbind(self.id);
                    self.send_frame(&Frame::disconnect()).await;
                    return Phase::Closed;
                }
                RecvOutcome::SocketClosed => {
                    self.roster.unbind(self.id);
                    return Phase::Closed;
                }
                RecvOutcome::Message(raw) => match Frame::parse(&raw, Origin::Client) {
                    Ok(frame) if frame.kind() == FrameKind::ChatMssg => {
                        // Forwarded verbatim: the broker does not re-encode
                        // the frame or rewrite its NAME field.
                        if self.chat_queue.send(raw).await.is_err() {
                            // Broadcaster is gone; the broker is going down.
                            self.roster.unbind(self.id);
                            return Phase::Closed;
                        }
                    }
                    Ok(frame) if frame.kind() == FrameKind::ExitChat => {
                        self.roster.unbind(self.id);
                        self.send_frame(&Frame::disconnect()).await;
                        return Phase::Closed;
                    }
                    Ok(frame) => {
                        debug!(
                            id = self.id.0,
                            kind = %frame.kind(),
                            "unexpected kind from registered client"
                        );
                        self.roster.unbind(self.id);
                        self.send_frame(&Frame::disconnect()).await;
                        return Phase::Closed;
                    }
                    Err(err) => {
                        debug!(id = self.id.0, %err, "unparseable message from registered client");
                        self.roster.unbind(self.id);
                        self.send_frame(&Frame::disconnect()).await;
                        return Phase::Closed;
                    }
                },
            }
        }
    }

    /// Waits for the next client message, bounded by `limit` and
    /// interruptible by socket closure or the broker closing.
    ///
    /// `wait_for` checks the current lifecycle value before parking, so a
    /// session spawned after the close began still winds down promptly.
    async fn next_message(&mut self, limit: Duration) -> RecvOutcome {
        if limit.is_zero() {
            return RecvOutcome::TimedOut;
        }
        tokio::select! {
            received = timeout(limit, self.inbound.recv()) => match received {
                Ok(Some(raw)) => RecvOutcome::Message(raw),
                Ok(None) => RecvOutcome::SocketClosed,
                Err(_) => RecvOutcome::TimedOut,
            },
            _ = self.lifecycle.wait_for(|state| state.is_closing()) => RecvOutcome::Shutdown,
        }
    }

    /// Protocol-error exit from the naming phase. A parse failure and an
    /// unexpected kind take the same path.
    async fn disconnect_unnamed_on_protocol_error(&mut self, reason: &str) {
        debug!(id = self.id.0, reason, "disconnecting unnamed client");
        self.roster.release();
        self.send_frame(&Frame::disconnect()).await;
    }

    /// Best-effort frame delivery. Failures are logged and swallowed:
    /// they never change bookkeeping or block a phase transition.
    async fn send_frame(&self, frame: &Frame) {
        if let Err(err) = self
            .handle
            .send_timeout(OutboundMessage::Frame(frame.encode()), self.send_timeout)
            .await
        {
            debug!(id = self.id.0, %err, kind = %frame.kind(), "dropping outbound frame");
        }
    }

    /// Builds and sends a reply that echoes the client's requested name.
    async fn send_named_reply(&self, kind: FrameKind, name: &str) {
        match Frame::new(kind, Some(name), None) {
            Ok(frame) => self.send_frame(&frame).await,
            // The name came out of a parsed frame, so this cannot fail;
            // losing a reply is still preferable to a panic.
            Err(err) => debug!(id = self.id.0, %err, "reply frame rejected"),
        }
    }
}
