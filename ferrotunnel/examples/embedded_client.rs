//! Example: Embedded `FerroTunnel` Client
//!
//! Shows how to embed the `FerroTunnel` client in your own application
//! instead of running the `ferrotunnel-client` binary.
//!
//! # Usage
//!
//! ```bash
//! # Start a local HTTP server on port 8000 (e.g., with Python)
//! python3 -m http.server 8000
//!
//! # Run this example
//! cargo run --example embedded_client -- ws://localhost:8765/ws 8000
//! ```

use ferrotunnel::Client;
use std::env;

#[tokio::main]
async fn main() -> ferrotunnel::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,ferrotunnel=debug")
        .init();

    let args: Vec<String> = env::args().collect();
    let server_url = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "ws://localhost:8765/ws".to_string());
    let local_port: u16 = args.get(2).and_then(|a| a.parse().ok()).unwrap_or(8000);

    println!("`FerroTunnel` Embedded Client Example");
    println!("====================================");
    println!("Server:     {server_url}");
    println!("Local port: {local_port}");
    println!();

    let mut client = Client::builder()
        .server_url(server_url.clone())
        .local_port(local_port)
        .auto_reconnect(true)
        .build()?;

    println!("Connecting to server...");
    client.start().await?;
    println!("Connected!");
    println!();
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    println!("\nShutting down...");
    client.shutdown().await?;

    Ok(())
}
