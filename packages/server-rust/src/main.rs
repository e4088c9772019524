//! Broker entry point: CLI parsing, tracing setup, and task wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tmp_server::network::config::{AssetConfig, BrokerConfig, SessionConfig};
use tmp_server::{assets, telemetry, NetworkModule};

/// Multi-user chat broker speaking the TMP wire protocol.
#[derive(Debug, Parser)]
#[command(name = "tmp-server", version, about)]
struct Cli {
    /// Broker bind host.
    #[arg(long, env = "TMP_HOST", default_value = "localhost")]
    host: String,

    /// Broker port.
    #[arg(long, env = "TMP_PORT", default_value_t = 5050)]
    port: u16,

    /// Maximum concurrently admitted clients.
    #[arg(long, env = "TMP_MAX_CLIENTS", default_value_t = 50)]
    max_clients: usize,

    /// Seconds a client may take to register a display name.
    #[arg(long, env = "TMP_NAME_TIMEOUT_SECS", default_value_t = 45)]
    name_timeout_secs: u64,

    /// Idle seconds allowed between messages from a registered client.
    #[arg(long, env = "TMP_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    idle_timeout_secs: u64,

    /// Port the browser client is served from.
    #[arg(long, env = "TMP_ASSET_PORT", default_value_t = 5000)]
    asset_port: u16,

    /// Directory served to browsers.
    #[arg(long, env = "TMP_ASSET_DIR", default_value = "static")]
    asset_dir: PathBuf,
}

impl Cli {
    fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.host.clone(),
            port: self.port,
            max_clients: self.max_clients,
            session: SessionConfig {
                name_timeout: Duration::from_secs(self.name_timeout_secs),
                idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            },
            ..BrokerConfig::default()
        }
    }

    fn asset_config(&self) -> AssetConfig {
        AssetConfig {
            port: self.asset_port,
            root_dir: self.asset_dir.clone(),
            ..AssetConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("starting broker on {}:{}", cli.host, cli.port);

    let mut network = NetworkModule::new(cli.broker_config());
    let roster = network.roster();
    let shutdown = network.shutdown_controller();
    network.start().await?;

    let asset_config = cli.asset_config();
    let mut asset_lifecycle = shutdown.subscribe();
    tokio::spawn(async move {
        let result = assets::serve(asset_config, async move {
            let _ = asset_lifecycle.wait_for(|state| state.is_closing()).await;
        })
        .await;
        if let Err(err) = result {
            error!(%err, "asset server failed");
        }
    });

    tokio::spawn(telemetry::run_occupancy_reporter(
        Arc::clone(&roster),
        shutdown.subscribe(),
        telemetry::REPORT_INTERVAL,
    ));

    network
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
