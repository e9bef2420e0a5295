//! `FerroTunnel` client binary.
//!
//! Configured entirely from the environment (`FERROTUNNEL_SERVER_URL`,
//! `FERROTUNNEL_LOCAL_PORT`, `FERROTUNNEL_REQUEST_TIMEOUT`,
//! `FERROTUNNEL_AUTO_RECONNECT`; `RUST_LOG` controls verbosity). CLI
//! argument parsing and config-file I/O are explicitly out of scope.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use ferrotunnel::{Client, ClientConfig};
use ferrotunnel_observability::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ClientConfig::from_env();
    config.validate()?;

    info!(
        server_url = %config.server_url,
        local_port = config.local_port,
        auto_reconnect = config.auto_reconnect,
        "starting FerroTunnel client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut client = Client::builder()
        .server_url(config.server_url.clone())
        .local_port(config.local_port)
        .request_timeout(config.request_timeout)
        .auto_reconnect(config.auto_reconnect)
        .build()?;

    client.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, closing tunnel");
    client.shutdown().await?;

    Ok(())
}
