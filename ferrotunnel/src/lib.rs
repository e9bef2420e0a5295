//! # `FerroTunnel`
//!
//! A reverse HTTP tunneling service: a client behind NAT connects outbound
//! to a publicly reachable server over a persistent WebSocket control
//! channel, and the server exposes a public port per tunnel that proxies
//! inbound HTTP requests to the client, which relays them to a local HTTP
//! service and returns the response over the same channel.
//!
//! ## Architecture
//!
//! - [`ferrotunnel-common`] — shared error types, constants, and config
//!   fragments.
//! - [`ferrotunnel-protocol`] — the wire frame types and JSON codec.
//! - [`ferrotunnel-core`] — the tunnel session state machine, registries,
//!   port allocator, rate limiter, and client proxier.
//! - [`ferrotunnel-http`] — the per-tunnel HTTP ingress listener.
//! - [`ferrotunnel-observability`] — metrics, tracing setup, and the
//!   health/metrics HTTP endpoints.
//!
//! This crate wires those pieces into the embeddable [`Server`] and
//! [`Client`] builders.

pub mod client;
pub mod config;
pub mod server;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ServerConfig};
pub use server::{Server, ServerBuilder};

pub use ferrotunnel_common as common;
pub use ferrotunnel_protocol as protocol;

pub use common::{Result, TunnelError};
pub use protocol::{decode_body, encode_body, Frame, FrameError};

/// Convenience re-exports for embedding a server or client.
pub mod prelude {
    pub use crate::common::{Result, TunnelError};
    pub use crate::protocol::{decode_body, encode_body, Frame, FrameError};
    pub use crate::{Client, ClientBuilder, ClientConfig, Server, ServerBuilder, ServerConfig};
}
