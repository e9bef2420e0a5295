//! Wire-level encoding of [`Frame`] over a WebSocket transport.
//!
//! The control channel is a WebSocket (see
//! `ferrotunnel-core::tunnel::server`); each control-channel message is a
//! single WebSocket text frame carrying one JSON-encoded [`Frame`]. This
//! module keeps the frame/wire separation the rest of the workspace uses
//! even though, unlike a raw-TCP length-prefixed codec, the WebSocket layer
//! already handles message framing for us.

use axum::extract::ws::Message as WsMessage;

use crate::frame::{Frame, FrameError};

/// Encode a [`Frame`] as an outbound WebSocket text message.
pub fn encode(frame: &Frame) -> Result<WsMessage, FrameError> {
    let bytes = frame.encode()?;
    let text = String::from_utf8(bytes).expect("serde_json always produces valid UTF-8");
    Ok(WsMessage::Text(text.into()))
}

/// Decode an inbound WebSocket message into a [`Frame`].
///
/// Returns `Ok(None)` for WebSocket control frames (ping/pong/close) that
/// carry no application payload; `axum` answers ping/pong at the transport
/// layer already, so these never need to reach the control-channel reader.
pub fn decode(message: WsMessage) -> Result<Option<Frame>, FrameError> {
    match message {
        WsMessage::Text(text) => Frame::decode(text.as_bytes()).map(Some),
        WsMessage::Binary(bytes) => Frame::decode(&bytes).map(Some),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) => Ok(None),
    }
}
