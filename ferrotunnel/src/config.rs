//! Configuration types for `FerroTunnel` client and server.
//!
//! CLI argument parsing and configuration-file I/O are out of scope; the
//! server and client are configured entirely from the environment
//! variables named in the control-channel interface.

use std::env;
use std::time::Duration;

use ferrotunnel_common::{
    Result, TunnelError, DEFAULT_IDLE_THRESHOLD_SECS, DEFAULT_MAX_CLIENTS_PER_SERVER,
    DEFAULT_PUBLIC_PORT_END, DEFAULT_PUBLIC_PORT_START, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SERVER_ID, DEFAULT_WS_PORT,
};
use ferrotunnel_common::config::RateLimitConfig;

/// Configuration for the tunnel server.
///
/// Use [`ServerBuilder`](crate::ServerBuilder) for ergonomic construction,
/// or [`ServerConfig::from_env`] to read the process environment directly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Control-channel (WebSocket) listen port.
    pub ws_port: u16,
    /// First port in the allocatable public-ingress range.
    pub public_port_start: u16,
    /// Last port in the allocatable public-ingress range.
    pub public_port_end: u16,
    /// Per-request upstream timeout.
    pub request_timeout: Duration,
    /// Maximum concurrent tunnel sessions.
    pub max_clients: usize,
    /// Identity reported in `registered`/health frames.
    pub server_id: String,
    /// Idle-eviction threshold.
    pub idle_threshold: Duration,
    /// Per-IP ingress admission rate limit.
    pub rate_limit: RateLimitConfig,
}

impl ServerConfig {
    /// Read the server configuration surface from the environment,
    /// falling back to the documented defaults for anything unset or
    /// unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            ws_port: env_u16("WS_PORT", DEFAULT_WS_PORT),
            public_port_start: env_u16("PUBLIC_PORT_START", DEFAULT_PUBLIC_PORT_START),
            public_port_end: env_u16("PUBLIC_PORT_END", DEFAULT_PUBLIC_PORT_END),
            request_timeout: Duration::from_secs(env_u64(
                "REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            max_clients: env_u64(
                "MAX_CLIENTS_PER_SERVER",
                DEFAULT_MAX_CLIENTS_PER_SERVER as u64,
            ) as usize,
            server_id: env::var("SERVER_ID").unwrap_or_else(|_| DEFAULT_SERVER_ID.to_string()),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_THRESHOLD_SECS),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the public port range is empty or inverted.
    pub fn validate(&self) -> Result<()> {
        if self.public_port_start > self.public_port_end {
            return Err(TunnelError::Config(
                "public_port_start must be <= public_port_end".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_port: DEFAULT_WS_PORT,
            public_port_start: DEFAULT_PUBLIC_PORT_START,
            public_port_end: DEFAULT_PUBLIC_PORT_END,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_clients: DEFAULT_MAX_CLIENTS_PER_SERVER,
            server_id: DEFAULT_SERVER_ID.to_string(),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_THRESHOLD_SECS),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Configuration for the tunnel client.
///
/// Use [`ClientBuilder`](crate::ClientBuilder) for ergonomic construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control-channel WebSocket URL, e.g. `ws://tunnel.example.com:8765/ws`.
    pub server_url: String,
    /// Local port the proxier forwards to (`http://127.0.0.1:{local_port}`).
    pub local_port: u16,
    /// Timeout for each local HTTP call.
    pub request_timeout: Duration,
    /// Enable automatic reconnection on disconnect.
    pub auto_reconnect: bool,
}

impl ClientConfig {
    /// Read the client configuration surface from the environment.
    ///
    /// `FERROTUNNEL_SERVER_URL` and `FERROTUNNEL_LOCAL_PORT` have no
    /// sensible default and are left empty/zero when unset; callers should
    /// run [`ClientConfig::validate`] before use.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server_url: env::var("FERROTUNNEL_SERVER_URL").unwrap_or_default(),
            local_port: env_u16("FERROTUNNEL_LOCAL_PORT", 0),
            request_timeout: Duration::from_secs(env_u64(
                "FERROTUNNEL_REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            auto_reconnect: env::var("FERROTUNNEL_AUTO_RECONNECT")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `server_url` is empty or `local_port` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(TunnelError::Config("server_url is required".into()));
        }
        if self.local_port == 0 {
            return Err(TunnelError::Config("local_port must be in [1, 65535]".into()));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            local_port: 0,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auto_reconnect: true,
        }
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
