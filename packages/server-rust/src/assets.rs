//! Static asset surface for the browser client.
//!
//! A plain file server on its own port, fully independent of the broker
//! core. The one protocol requirement is that `.js` files are delivered
//! as `application/javascript` so browsers will execute the client;
//! `ServeDir`'s MIME guessing already does that.

use std::future::Future;
use std::path::Path;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::network::config::AssetConfig;

/// Builds the file-serving router over `root`.
#[must_use]
pub fn build_router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(TraceLayer::new_for_http())
}

/// Serves the asset directory until the shutdown future completes.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server hits a
/// fatal I/O error.
pub async fn serve(
    config: AssetConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("asset server listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(&config.root_dir))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
