//! Per-connection send plumbing.
//!
//! Every accepted socket gets a bounded mpsc channel. The receiver end is
//! drained by the socket's write loop; the sender end lives in a
//! [`ConnectionHandle`] shared between the client's session and the
//! broadcaster. The bound is the backpressure: a slow reader fills its
//! channel and the broadcaster skips it rather than stalling the fan-out.

use std::time::Duration;

use tokio::sync::mpsc;

/// Unique identifier for a connection, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Message queued for delivery to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// An encoded protocol frame, sent as one text message.
    Frame(String),
    /// Close the socket after flushing queued frames.
    Close,
}

/// Error returned when sending a message to a connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The channel stayed full for the whole timeout.
    #[error("send timed out; outbound channel stayed full")]
    Timeout,
    /// The write loop has exited and dropped the receiver.
    #[error("connection closed")]
    Disconnected,
}

/// Handle to a single connection's outbound channel.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection identifier.
    pub id: ConnectionId,
    tx: mpsc::Sender<OutboundMessage>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiver its write loop drains.
    #[must_use]
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { id, tx }, rx)
    }

    /// Attempts to enqueue a message without blocking.
    ///
    /// Returns `false` when the channel is full or the connection has
    /// closed; fan-out callers treat both the same way.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Enqueues a message, waiting up to `timeout` for channel space.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Timeout`] if the channel stays full, or
    /// [`SendError::Disconnected`] if the write loop is gone.
    pub async fn send_timeout(
        &self,
        msg: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Disconnected),
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Whether the write loop still holds its receiver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_send_enqueues_until_full() {
        let (handle, _rx) = ConnectionHandle::channel(ConnectionId(1), 2);
        assert!(handle.try_send(OutboundMessage::Frame("a".into())));
        assert!(handle.try_send(OutboundMessage::Frame("b".into())));
        assert!(!handle.try_send(OutboundMessage::Frame("c".into())));
    }

    #[test]
    fn try_send_fails_after_receiver_drops() {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId(1), 2);
        drop(rx);
        assert!(!handle.try_send(OutboundMessage::Close));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn send_timeout_delivers_when_space_exists() {
        let (handle, mut rx) = ConnectionHandle::channel(ConnectionId(1), 1);
        handle
            .send_timeout(OutboundMessage::Frame("x".into()), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(OutboundMessage::Frame("x".into())));
    }

    #[tokio::test]
    async fn send_timeout_reports_disconnected() {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId(1), 1);
        drop(rx);
        let err = handle
            .send_timeout(OutboundMessage::Close, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, SendError::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn send_timeout_reports_timeout_on_full_channel() {
        let (handle, _rx) = ConnectionHandle::channel(ConnectionId(1), 1);
        assert!(handle.try_send(OutboundMessage::Frame("fill".into())));
        let err = handle
            .send_timeout(OutboundMessage::Close, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, SendError::Timeout);
    }
}
