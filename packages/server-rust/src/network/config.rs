//! Broker configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the chat broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bind address for the broker.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned, used by tests.
    pub port: u16,
    /// Maximum concurrently admitted clients.
    pub max_clients: usize,
    /// Phase timeouts applied to every client session.
    pub session: SessionConfig,
    /// Per-connection channel settings.
    pub connection: ConnectionConfig,
    /// Capacity of the shared chat fan-out queue. Producers (sessions)
    /// block on enqueue when it fills.
    pub broadcast_queue_capacity: usize,
    /// Allowed CORS origins for the HTTP surface.
    pub cors_origins: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5050,
            max_clients: 50,
            session: SessionConfig::default(),
            connection: ConnectionConfig::default(),
            broadcast_queue_capacity: 1024,
            cors_origins: vec!["*".to_owned()],
        }
    }
}

/// Phase timeouts for a client session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Total budget to register a name. Cumulative: rejected attempts do
    /// not restart it.
    pub name_timeout: Duration,
    /// Idle budget between messages once registered. Resets on every
    /// received message.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name_timeout: Duration::from_secs(45),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Per-connection channel settings controlling backpressure.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bounded mpsc channel capacity for outbound messages per connection.
    pub outbound_channel_capacity: usize,
    /// Maximum time a session waits to enqueue a control frame.
    pub send_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Static asset server configuration.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Bind address for the asset server.
    pub host: String,
    /// Port the browser client is served from.
    pub port: u16,
    /// Directory whose files are served.
    pub root_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 5000,
            root_dir: PathBuf::from("static"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5050);
        assert_eq!(config.max_clients, 50);
        assert_eq!(config.broadcast_queue_capacity, 1024);
        assert_eq!(config.cors_origins, vec!["*"]);
    }

    #[test]
    fn session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.name_timeout, Duration::from_secs(45));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn connection_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.outbound_channel_capacity, 256);
        assert_eq!(config.send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn asset_defaults() {
        let config = AssetConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.root_dir, PathBuf::from("static"));
    }
}
