//! Default configuration values for `FerroTunnel` services.
//!
//! Mirrors the environment-variable defaults named in the external
//! interfaces: use these instead of magic numbers so the binaries, the
//! facade crate, and tests stay consistent.

/// Default control-channel (WebSocket) listen port.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Default first port in the allocatable public-ingress range.
pub const DEFAULT_PUBLIC_PORT_START: u16 = 5000;

/// Default last port in the allocatable public-ingress range.
pub const DEFAULT_PUBLIC_PORT_END: u16 = 5999;

/// Default per-request upstream timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default maximum concurrent tunnel sessions.
pub const DEFAULT_MAX_CLIENTS_PER_SERVER: usize = 100;

/// Default server identity reported in `registered`/health frames.
pub const DEFAULT_SERVER_ID: &str = "server-1";

/// Default idle-eviction threshold, in seconds.
pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 300;

/// Cadence of the idle-eviction sweep, in seconds.
pub const IDLE_SWEEP_INTERVAL_SECS: u64 = 60;
