//! Health endpoint handler.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns broker health as JSON.
///
/// Always returns 200 — the `state` field says whether the broker is
/// actually healthy, which lets monitoring distinguish "up but draining"
/// from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.shutdown.lifecycle().as_str(),
        "occupancy": state.roster.occupancy(),
        "capacity": state.roster.capacity(),
        "registered": state.roster.bound_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
