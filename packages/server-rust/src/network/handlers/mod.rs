//! HTTP and WebSocket handler definitions for the broker.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports the handler functions used when building the router.

pub mod health;
pub mod websocket;

pub use health::health_handler;
pub use websocket::ws_upgrade_handler;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use super::{BrokerConfig, ShutdownController};
use crate::roster::Roster;

/// Shared application state passed to all axum handlers via `State`.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The table coupling connections, names, and occupancy.
    pub roster: Arc<Roster>,
    /// Graceful shutdown controller with health state and session tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Broker configuration.
    pub config: Arc<BrokerConfig>,
    /// Producer side of the chat fan-out queue.
    pub chat_queue: mpsc::Sender<String>,
    /// Source of connection identifiers. Starts at 1; 0 is never issued.
    pub next_connection_id: Arc<AtomicU64>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
