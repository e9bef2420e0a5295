//! Error types for `FerroTunnel`.
//!
//! Variants map directly onto the error kinds and HTTP status mapping named
//! in the tunnel's error-handling design: `MalformedFrame` is logged and
//! ignored by the control-channel reader rather than propagated here;
//! everything else has a well-defined caller-visible outcome (an `error`
//! frame during registration, or an HTTP status at the ingress).

use thiserror::Error;

/// Main error type for `FerroTunnel` operations.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error, e.g. a malformed control-channel frame.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `register` carried a missing or out-of-range `local_port`.
    #[error("invalid register: {0}")]
    InvalidRegister(String),

    /// The configured public port range has no free port.
    #[error("no free public ports")]
    PortsExhausted,

    /// The tunnel registry is at `MAX_CLIENTS_PER_SERVER` capacity.
    #[error("server at capacity")]
    AtCapacity,

    /// The control channel closed before a response arrived.
    #[error("control channel closed")]
    ChannelClosed,

    /// No response frame arrived within `REQUEST_TIMEOUT`.
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// The client reported an error, or sent a response that failed to
    /// decode.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// The remote IP exceeded the per-IP admission rate limit.
    #[error("rate limited")]
    RateLimited,

    /// A control-channel message was not valid JSON, had an unknown `type`,
    /// or exceeded the message size cap.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A required configuration value was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, TunnelError>;
