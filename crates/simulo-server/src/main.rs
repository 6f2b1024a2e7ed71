//! Simulo hub: WebSocket sessions plus the agent endpoint.

use simulo_server::config::Config;
use simulo_server::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        "Starting simulo-server on {}:{} (max_clients = {})",
        config.bind_addr,
        config.port,
        config.max_clients
    );

    server::run(config).await
}
