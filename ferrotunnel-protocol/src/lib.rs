//! `FerroTunnel` wire protocol
//!
//! This crate defines the JSON control-channel protocol used between
//! `FerroTunnel` clients and servers.

pub mod codec;
pub mod constants;
pub mod frame;

pub use frame::{decode_body, encode_body, Frame, FrameError, MAX_MESSAGE_BYTES};
