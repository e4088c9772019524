//! Networking: configuration, connection plumbing, the per-client session
//! lifecycle, and the server module.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod session;
pub mod shutdown;

pub use config::{AssetConfig, BrokerConfig, ConnectionConfig, SessionConfig};
pub use connection::{ConnectionHandle, ConnectionId, OutboundMessage, SendError};
pub use handlers::AppState;
pub use module::NetworkModule;
pub use session::Session;
pub use shutdown::{Lifecycle, ShutdownController};
