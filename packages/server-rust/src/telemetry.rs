//! Periodic occupancy reporting.
//!
//! One log line every few seconds with the occupancy count and the set of
//! registered names. Human-readable operational output, not a structured
//! interface.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::network::shutdown::Lifecycle;
use crate::roster::Roster;

/// Default reporting period.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Emits the occupancy line every `period` until the broker closes.
pub async fn run_occupancy_reporter(
    roster: Arc<Roster>,
    mut lifecycle: watch::Receiver<Lifecycle>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately; skip it so startup logs stay tidy.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!(
                    occupancy = roster.occupancy(),
                    names = ?roster.names(),
                    "connected clients"
                );
            }
            _ = lifecycle.wait_for(|state| state.is_closing()) => break,
        }
    }
}
