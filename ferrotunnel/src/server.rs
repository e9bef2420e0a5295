//! Embeddable tunnel server with builder pattern.
//!
//! Wires together the process-wide collaborators — port allocator, tunnel
//! registry, pending-request registry, HTTP ingress spawner, and metrics —
//! behind the control-channel WebSocket route and the health/metrics
//! routes, all on one listener (spec's "control listener host").
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrotunnel::Server;
//!
//! # async fn example() -> ferrotunnel::Result<()> {
//! let mut server = Server::builder()
//!     .ws_port(8765)
//!     .public_port_range(5000, 5999)
//!     .build()?;
//!
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use ferrotunnel_common::{Result, TunnelError, IDLE_SWEEP_INTERVAL_SECS};
use ferrotunnel_core::rate_limit::IngressAdmission;
use ferrotunnel_core::tunnel::registry::run_idle_eviction_sweep;
use ferrotunnel_core::tunnel::server::{ws_router, ServerState};
use ferrotunnel_core::{PendingRegistry, PortAllocator, TracingEventSink, TunnelRegistry};
use ferrotunnel_http::HttpIngressSpawner;
use ferrotunnel_observability::health::{self, HealthState, PortUtilization};
use ferrotunnel_observability::ServerMetrics;

use crate::config::ServerConfig;

/// A tunnel server that can be embedded in your application.
///
/// Use [`Server::builder()`] to create a new server with the builder pattern.
pub struct Server {
    config: ServerConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
}

/// Builder for constructing a [`Server`] with ergonomic configuration.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Start the tunnel server.
    ///
    /// Binds the control listener (WebSocket control channel plus
    /// `/health` and `/metrics`) and runs until [`shutdown()`](Self::shutdown)
    /// is called. Awaits inline for the server's lifetime; callers that
    /// want to keep driving other work should `tokio::spawn` this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is already running, or if the
    /// configured `ws_port` cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        if self.shutdown_tx.is_some() {
            return Err(TunnelError::Config("server already started".into()));
        }

        let config = self.config.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        info!(ws_port = config.ws_port, server_id = %config.server_id, "starting FerroTunnel server");

        let registry = Arc::new(TunnelRegistry::new(config.max_clients));
        let ports = Arc::new(PortAllocator::new(config.public_port_start, config.public_port_end));
        let pending = Arc::new(PendingRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let admission = Arc::new(IngressAdmission::new(&config.rate_limit));

        let ingress_spawner = Arc::new(HttpIngressSpawner::new(
            pending.clone(),
            admission,
            metrics.clone(),
            config.request_timeout,
        ));

        let server_state = Arc::new(ServerState {
            registry: registry.clone(),
            ports: ports.clone(),
            pending,
            ingress_spawner,
            event_sink: Arc::new(TracingEventSink),
            metrics: metrics.clone(),
            server_id: config.server_id.clone(),
        });

        let health_state = Arc::new(HealthState {
            server_id: config.server_id.clone(),
            metrics,
            ports: Arc::new(PortRangeUtilization(ports)) as Arc<dyn PortUtilization>,
        });

        let app = ws_router(server_state)
            .merge(health::router(health_state))
            .into_make_service_with_connect_info::<SocketAddr>();

        let addr = SocketAddr::from(([0, 0, 0, 0], config.ws_port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "control listener bound");

        let sweep = tokio::spawn(run_idle_eviction_sweep(
            registry,
            config.idle_threshold,
            Duration::from_secs(IDLE_SWEEP_INTERVAL_SECS),
        ));

        let result = tokio::select! {
            result = axum::serve(listener, app) => {
                result.map_err(|e| TunnelError::Config(format!("control listener failed: {e}")))
            }
            _ = shutdown_rx.changed() => {
                info!("server shutdown requested");
                Ok(())
            }
        };

        sweep.abort();
        self.shutdown_tx = None;
        result
    }

    /// Signal shutdown and wait for the `start()` caller to observe it.
    ///
    /// Note this only flips the shutdown signal; the actual listener stops
    /// once the in-flight [`start()`](Self::start) call returns, so callers
    /// typically hold the `JoinHandle` from spawning `start()` themselves
    /// if they need to wait for full teardown.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stop();
        Ok(())
    }

    /// Signal the server to stop (non-blocking).
    ///
    /// Use [`shutdown()`](Self::shutdown) if you prefer an `async` call site.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Check if the server is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Get the current configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

impl ServerBuilder {
    /// Set the control-channel (WebSocket) listen port.
    ///
    /// Default: `8765`.
    #[must_use]
    pub fn ws_port(mut self, port: u16) -> Self {
        self.config.ws_port = port;
        self
    }

    /// Set the allocatable public-ingress port range, inclusive.
    ///
    /// Default: `5000..=5999`.
    #[must_use]
    pub fn public_port_range(mut self, start: u16, end: u16) -> Self {
        self.config.public_port_start = start;
        self.config.public_port_end = end;
        self
    }

    /// Set the maximum number of concurrent tunnel sessions.
    ///
    /// Default: `100`.
    #[must_use]
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.config.max_clients = max_clients;
        self
    }

    /// Set the server identity reported in `registered`/health frames.
    #[must_use]
    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.config.server_id = server_id.into();
        self
    }

    /// Set the per-request upstream timeout.
    ///
    /// Default: 30 seconds.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Build the server with the configured options.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured public port range is empty or
    /// inverted.
    pub fn build(self) -> Result<Server> {
        self.config.validate()?;
        Ok(Server {
            config: self.config,
            shutdown_tx: None,
        })
    }
}

struct PortRangeUtilization(Arc<PortAllocator>);

impl PortUtilization for PortRangeUtilization {
    fn port_utilization(&self) -> f64 {
        let leased = self.0.leased_count();
        let total = self.0.range_size();
        if total == 0 {
            0.0
        } else {
            leased as f64 / total as f64
        }
    }
}
