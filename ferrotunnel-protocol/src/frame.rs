//! Control-channel wire frames.
//!
//! Every frame is a UTF-8 JSON object with a `type` discriminant. Bodies are
//! always base64-encoded, even when empty.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Maximum size, in bytes, of a single encoded control-channel message.
pub const MAX_MESSAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    Register {
        local_port: u16,
    },
    Registered {
        public_port: u16,
        server_id: String,
    },
    Request {
        request_id: String,
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: String,
        client_ip: String,
        timestamp: f64,
    },
    Response {
        request_id: String,
        status: u16,
        headers: HashMap<String, String>,
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_time_ms: Option<u64>,
    },
    Ping {
        timestamp: f64,
    },
    Pong,
    Error {
        message: String,
    },
}

impl Frame {
    /// Decode a UTF-8 JSON control-channel message, enforcing the size cap.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() > MAX_MESSAGE_BYTES {
            return Err(FrameError::TooLarge(raw.len()));
        }
        serde_json::from_slice(raw).map_err(FrameError::Malformed)
    }

    /// Encode this frame to a UTF-8 JSON message. Fails if the encoded size
    /// would exceed the channel cap (a request/response body too large to
    /// fit was never a valid send in the first place).
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let bytes = serde_json::to_vec(self).map_err(FrameError::Malformed)?;
        if bytes.len() > MAX_MESSAGE_BYTES {
            return Err(FrameError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Register { .. } => "register",
            Frame::Registered { .. } => "registered",
            Frame::Request { .. } => "request",
            Frame::Response { .. } => "response",
            Frame::Ping { .. } => "ping",
            Frame::Pong => "pong",
            Frame::Error { .. } => "error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("message of {0} bytes exceeds the {MAX_MESSAGE_BYTES}-byte cap")]
    TooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Base64-encode a request/response body, per the wire contract (empty body
/// encodes to an empty string, not omitted).
pub fn encode_body(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a base64 body field back to raw bytes.
pub fn decode_body(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trips() {
        let frame = Frame::Register { local_port: 3000 };
        let bytes = frame.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.type_name(), "register");
    }

    #[test]
    fn request_carries_discriminant_and_base64_body() {
        let mut headers = HashMap::new();
        headers.insert("X-Test".to_string(), "1".to_string());
        let frame = Frame::Request {
            request_id: "r1".to_string(),
            method: "GET".to_string(),
            path: "/foo".to_string(),
            headers,
            body: encode_body(b"hi"),
            client_ip: "127.0.0.1".to_string(),
            timestamp: 0.0,
        };
        let bytes = frame.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["body"], "aGk=");
    }

    #[test]
    fn empty_body_encodes_to_empty_string_not_omitted() {
        assert_eq!(encode_body(b""), "");
    }

    #[test]
    fn oversize_message_is_rejected_on_decode() {
        let raw = vec![b'a'; MAX_MESSAGE_BYTES + 1];
        let err = Frame::decode(&raw).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Frame::decode(b"{not json").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = Frame::decode(br#"{"type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }
}
