//! Broker lifecycle signalling.
//!
//! One watch channel carries the broker's lifecycle state. Sessions hold
//! receivers and treat the move to `Closing` as the order to leave their
//! recv loops and run their roster bookkeeping; the health route reads
//! the current value; the server module drives the transitions.
//!
//! Draining is deliberately not tracked here. The unit of drain in a
//! chat broker is the admitted connection, and the roster already counts
//! those — occupancy reaching zero means every session has checked out.
//! `serve` therefore awaits [`crate::roster::Roster::drained`] rather
//! than keeping a second counter in this module.

use tokio::sync::watch;

/// Where the broker is in its lifetime.
///
/// Transitions only move forward: `Booting -> Serving -> Closing ->
/// Down`. A close order can arrive before the listener is up, so
/// [`ShutdownController::set_serving`] refuses to overwrite a close
/// already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Allocated, listener not accepting yet.
    Booting,
    /// Accepting connections and relaying chat.
    Serving,
    /// Told to stop: no new sessions, existing ones are wrapping up.
    Closing,
    /// The roster has emptied; nothing is running anymore.
    Down,
}

impl Lifecycle {
    /// Lowercase label used in health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Booting => "booting",
            Self::Serving => "serving",
            Self::Closing => "closing",
            Self::Down => "down",
        }
    }

    /// Whether sessions should stop taking client input.
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::Closing | Self::Down)
    }
}

/// Publishes lifecycle transitions to everyone who watches them.
#[derive(Debug)]
pub struct ShutdownController {
    lifecycle: watch::Sender<Lifecycle>,
}

impl ShutdownController {
    /// Starts the broker's lifecycle at `Booting`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: watch::channel(Lifecycle::Booting).0,
        }
    }

    /// The listener is up; sessions may be admitted.
    ///
    /// A no-op unless the broker is still booting, so a close order that
    /// raced ahead of startup is never regressed.
    pub fn set_serving(&self) {
        self.lifecycle.send_if_modified(|state| {
            if matches!(state, Lifecycle::Booting) {
                *state = Lifecycle::Serving;
                true
            } else {
                false
            }
        });
    }

    /// Orders every session to wrap up. Idempotent, and a no-op once the
    /// broker is already closing or down.
    pub fn begin_close(&self) {
        self.lifecycle.send_if_modified(|state| {
            if state.is_closing() {
                false
            } else {
                *state = Lifecycle::Closing;
                true
            }
        });
    }

    /// Records that the drain finished and nothing is running.
    pub fn mark_down(&self) {
        self.lifecycle.send_replace(Lifecycle::Down);
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// A receiver observing every transition, starting from the current
    /// state — a session spawned mid-close still sees `Closing` on its
    /// first `wait_for`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
