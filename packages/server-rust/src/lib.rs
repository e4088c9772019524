//! TMP server — multi-user chat broker speaking the TMP wire protocol
//! over `WebSocket`, with a static asset surface for the browser client.
//!
//! The broker is four pieces: the [`roster`] (the one shared table of
//! connections, names, and occupancy), the per-client session lifecycle
//! in [`network::session`], the [`broadcast`] fan-out, and the
//! [`network::NetworkModule`] supervisor that ties them to a listener.

pub mod assets;
pub mod broadcast;
pub mod network;
pub mod roster;
pub mod telemetry;

pub use network::{
    AssetConfig, BrokerConfig, ConnectionConfig, NetworkModule, SessionConfig,
    ShutdownController,
};
pub use roster::{BindError, Roster};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_surface_is_reachable() {
        let roster = Roster::new(BrokerConfig::default().max_clients);
        assert_eq!(roster.capacity(), 50);
    }
}
