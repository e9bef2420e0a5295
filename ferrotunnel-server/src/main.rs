//! `FerroTunnel` server binary.
//!
//! Configured entirely from the environment (`WS_PORT`,
//! `PUBLIC_PORT_START`/`PUBLIC_PORT_END`, `REQUEST_TIMEOUT`,
//! `MAX_CLIENTS_PER_SERVER`, `SERVER_ID`; `RUST_LOG` controls verbosity).
//! CLI argument parsing and config-file I/O are explicitly out of scope.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use ferrotunnel::{Server, ServerConfig};
use ferrotunnel_observability::init_tracing;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::from_env();
    config.validate()?;

    info!(
        ws_port = config.ws_port,
        public_port_start = config.public_port_start,
        public_port_end = config.public_port_end,
        server_id = %config.server_id,
        "starting FerroTunnel server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut server = Server::builder()
        .ws_port(config.ws_port)
        .public_port_range(config.public_port_start, config.public_port_end)
        .max_clients(config.max_clients)
        .server_id(config.server_id.clone())
        .request_timeout(config.request_timeout)
        .build()?;

    if let Err(e) = server.start().await {
        error!(error = %e, "server exited with error");
        return Err(e.into());
    }

    Ok(())
}
