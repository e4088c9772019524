//! The broker's listener lifecycle.
//!
//! Construction, binding, and serving are three separate steps so the
//! binary can hand the roster and the lifecycle controller to telemetry
//! and the asset server before any traffic flows, and so tests can bind
//! port 0 and read the real port back.

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::config::BrokerConfig;
use super::connection::OutboundMessage;
use super::handlers::{health_handler, ws_upgrade_handler, AppState};
use super::middleware::build_cors_layer;
use super::shutdown::ShutdownController;
use crate::broadcast;
use crate::roster::Roster;

/// How long `serve` gives the roster to empty once the close begins.
const CLOSE_GRACE: Duration = Duration::from_secs(30);

/// Owns the broker's listener and walks it through its lifecycle.
///
/// `new` allocates the shared pieces — roster, lifecycle controller,
/// chat queue — without touching the network. `start` binds the port.
/// `serve` runs the accept loop until its shutdown future fires, then
/// closes the broker down: order the sessions to wrap up, wait for the
/// roster to empty, and let the broadcaster run dry.
pub struct NetworkModule {
    config: BrokerConfig,
    listener: Option<TcpListener>,
    roster: Arc<Roster>,
    shutdown: Arc<ShutdownController>,
    chat_tx: mpsc::Sender<String>,
    chat_rx: Option<mpsc::Receiver<String>>,
    next_connection_id: Arc<AtomicU64>,
}

impl NetworkModule {
    /// Allocates the broker's shared state. No port is bound yet.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let (chat_tx, chat_rx) = mpsc::channel(config.broadcast_queue_capacity);
        Self {
            roster: Arc::new(Roster::new(config.max_clients)),
            shutdown: Arc::new(ShutdownController::new()),
            listener: None,
            chat_tx,
            chat_rx: Some(chat_rx),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    /// Returns a shared reference to the roster.
    ///
    /// The telemetry reporter reads occupancy and names through this.
    #[must_use]
    pub fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }

    /// Returns a shared reference to the lifecycle controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            roster: Arc::clone(&self.roster),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            chat_queue: self.chat_tx.clone(),
            next_connection_id: Arc::clone(&self.next_connection_id),
            start_time: Instant::now(),
        }
    }

    /// Builds the broker's router: `GET /ws` upgrades into a chat
    /// session, `GET /health` reports broker health as JSON.
    #[must_use]
    pub fn build_router(&self) -> Router {
        make_router(self.app_state(), &self.config)
    }

    /// Binds the configured address and reports which port the broker
    /// ended up on — with port 0 the OS picks, which is how tests get an
    /// ephemeral listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("broker listening on {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until the shutdown future completes, then
    /// closes the broker down.
    ///
    /// The close sequence: the future fires, the lifecycle flips to
    /// closing, every session runs its roster bookkeeping and hangs up,
    /// hyper finishes the remaining connections, the roster empties, and
    /// finally the broadcaster drains the chat queue and exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics with "no bound listener" if `start()` was never called.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("no bound listener: call start() first");
        let chat_rx = self
            .chat_rx
            .take()
            .expect("chat queue receiver is taken once, here");

        let broadcaster = tokio::spawn(broadcast::run(chat_rx, Arc::clone(&self.roster)));

        let router = make_router(self.app_state(), &self.config);
        self.shutdown.set_serving();

        let ctrl = Arc::clone(&self.shutdown);
        let signal = async move {
            shutdown.await;
            info!("shutdown requested, closing sessions");
            ctrl.begin_close();
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        // Hyper only returns once its connections are done, but the
        // roster is the authority on whether every session finished its
        // bookkeeping.
        self.shutdown.begin_close();
        close_lingering_connections(&self.roster);
        if self.roster.drained(CLOSE_GRACE).await {
            self.shutdown.mark_down();
            info!("roster empty, broker down");
        } else {
            warn!("close grace period expired with clients still admitted");
        }

        // Our sender is the last one once the router and sessions are
        // gone; dropping it lets the broadcaster run dry and exit.
        drop(self.chat_tx);
        let _ = broadcaster.await;
        Ok(())
    }
}

/// Builds the route table shared by `build_router` and `serve`.
fn make_router(state: AppState, config: &BrokerConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .with_state(state)
}

/// Queues a close for every still-bound connection.
fn close_lingering_connections(roster: &Roster) {
    let handles = roster.snapshot();
    if !handles.is_empty() {
        info!("closing {} registered connections", handles.len());
        for handle in &handles {
            let _ = handle.try_send(OutboundMessage::Close);
        }
    }
}
