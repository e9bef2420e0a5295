//! Embeddable tunnel client with builder pattern.
//!
//! Drives [`ferrotunnel_core::TunnelClient`] in a background task, applying
//! exponential backoff between reconnect attempts via
//! [`ferrotunnel_core::reconnect::ReconnectManager`] when `auto_reconnect`
//! is enabled.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrotunnel::Client;
//!
//! # async fn example() -> ferrotunnel::Result<()> {
//! let mut client = Client::builder()
//!     .server_url("ws://tunnel.example.com:8765/ws")
//!     .local_port(8080)
//!     .build()?;
//!
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use ferrotunnel_common::{Result, TunnelError};
use ferrotunnel_core::reconnect::{BackoffConfig, ReconnectManager};
use ferrotunnel_core::TunnelClient;

use crate::config::ClientConfig;

/// A tunnel client that can be embedded in your application.
///
/// Use [`Client::builder()`] to create a new client with the builder pattern.
pub struct Client {
    config: ClientConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Builder for constructing a [`Client`] with ergonomic configuration.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Start the tunnel client in the background.
    ///
    /// Spawns a task that connects, registers `local_port`, and serves
    /// forwarded requests until [`shutdown()`](Self::shutdown) is called.
    /// When `auto_reconnect` is enabled, a dropped connection is retried
    /// with exponential backoff rather than ending the task.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Err(TunnelError::Config("client already started".into()));
        }

        let config = self.config.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let task = tokio::spawn(async move {
            let mut reconnect = ReconnectManager::new(BackoffConfig::default(), None);

            loop {
                let tunnel_client = TunnelClient::new(config.server_url.clone(), config.local_port)
                    .with_request_timeout(config.request_timeout);

                tokio::select! {
                    result = tunnel_client.connect_and_run() => {
                        match result {
                            Ok(()) => info!("tunnel connection closed"),
                            Err(e) => error!(error = %e, "tunnel connection failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("client shutdown requested");
                        break;
                    }
                }

                if !config.auto_reconnect || !reconnect.should_retry() {
                    break;
                }

                let Some(delay) = reconnect.on_disconnected() else {
                    error!("giving up after max reconnect attempts");
                    break;
                };
                info!(?delay, "reconnecting");

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        self.task = Some(task);
        Ok(())
    }

    /// Shutdown the tunnel client and wait for cleanup.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }

    /// Signal the client to stop (non-blocking).
    ///
    /// Use [`shutdown()`](Self::shutdown) if you need to wait for cleanup.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Check if the client is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished(),
            None => false,
        }
    }

    /// Get the current configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

impl ClientBuilder {
    /// Set the control-channel WebSocket URL to connect to, e.g.
    /// `ws://tunnel.example.com:8765/ws`.
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Set the local port the proxier forwards requests to.
    #[must_use]
    pub fn local_port(mut self, port: u16) -> Self {
        self.config.local_port = port;
        self
    }

    /// Set the timeout for each local HTTP call.
    ///
    /// Default: 30 seconds.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Enable or disable automatic reconnection.
    ///
    /// Default: `true`.
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Build the client with the configured options.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing:
    /// - `server_url` must be set
    /// - `local_port` must be in `[1, 65535]`
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        Ok(Client {
            config: self.config,
            shutdown_tx: None,
            task: None,
        })
    }
}
