//! Common utilities and types for `FerroTunnel`.

pub mod config;
pub mod constants;
pub mod error;

pub use config::{LimitsConfig, RateLimitConfig};
pub use constants::{
    DEFAULT_IDLE_THRESHOLD_SECS, DEFAULT_MAX_CLIENTS_PER_SERVER, DEFAULT_PUBLIC_PORT_END,
    DEFAULT_PUBLIC_PORT_START, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVER_ID, DEFAULT_WS_PORT,
    IDLE_SWEEP_INTERVAL_SECS,
};
pub use error::{Result, TunnelError};
