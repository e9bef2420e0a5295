//! Client-side control channel (component H, "Client Proxier"): connects to
//! the server's WebSocket endpoint, performs the register handshake, then
//! for every inbound `request` frame issues a local HTTP call and replies
//! with a `response` frame.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{info, warn};

use ferrotunnel_common::{Result, TunnelError};
use ferrotunnel_protocol::{decode_body, encode_body, Frame, FrameError};

/// Connects once, registers `local_port`, and forwards requests to
/// `http://127.0.0.1:{local_port}` until the channel closes. Reconnection
/// (backoff/jitter) is the caller's concern — see [`crate::reconnect`].
pub struct TunnelClient {
    server_url: String,
    local_port: u16,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl TunnelClient {
    #[must_use]
    pub fn new(server_url: impl Into<String>, local_port: u16) -> Self {
        Self {
            server_url: server_url.into(),
            local_port,
            http: reqwest::Client::new(),
            request_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Runs one connection lifetime: connect, register, serve. Returns once
    /// the server closes the channel or a transport error occurs; the
    /// caller decides whether and when to reconnect.
    pub async fn connect_and_run(&self) -> Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.server_url)
            .await
            .map_err(|e| TunnelError::Config(format!("connect to {} failed: {e}", self.server_url)))?;
        info!(url = %self.server_url, "connected to tunnel server");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match encode_message(&frame) {
                    Ok(msg) => {
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode outbound frame"),
                }
            }
        });

        outbound_tx
            .send(Frame::Register {
                local_port: self.local_port,
            })
            .await
            .map_err(|_| TunnelError::ChannelClosed)?;

        match ws_rx.next().await {
            Some(Ok(msg)) => match decode_message(msg)? {
                Some(Frame::Registered {
                    public_port,
                    server_id,
                }) => {
                    info!(public_port, %server_id, "registered with tunnel server");
                }
                Some(Frame::Error { message }) => {
                    writer.abort();
                    return Err(TunnelError::Config(format!(
                        "registration rejected: {message}"
                    )));
                }
                _ => {
                    writer.abort();
                    return Err(TunnelError::MalformedFrame(
                        "expected registered or error as the first reply".to_string(),
                    ));
                }
            },
            Some(Err(e)) => {
                writer.abort();
                return Err(TunnelError::Config(format!("transport error: {e}")));
            }
            None => {
                writer.abort();
                return Err(TunnelError::ChannelClosed);
            }
        }

        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "control channel read error");
                    break;
                }
            };
            let frame = match decode_message(msg) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "malformed frame from server, ignoring");
                    continue;
                }
            };

            match frame {
                Frame::Request {
                    request_id,
                    method,
                    path,
                    headers,
                    body,
                    client_ip: _,
                    timestamp: _,
                } => {
                    let outbound = outbound_tx.clone();
                    let http = self.http.clone();
                    let local_port = self.local_port;
                    let timeout = self.request_timeout;
                    tokio::spawn(async move {
                        let response =
                            forward_to_local(&http, local_port, timeout, request_id, method, path, headers, body)
                                .await;
                        let _ = outbound.send(response).await;
                    });
                }
                Frame::Ping { .. } => {
                    let _ = outbound_tx.send(Frame::Pong).await;
                }
                Frame::Pong => {}
                Frame::Error { message } => warn!(%message, "server reported error"),
                other => warn!(frame = other.type_name(), "unexpected frame from server, ignoring"),
            }
        }

        writer.abort();
        Ok(())
    }
}

/// Issues the local HTTP call for one forwarded request and builds the
/// matching `response` frame. Transport failures map to 502, local timeouts
/// to 504, per the client proxier contract.
#[allow(clippy::too_many_arguments)]
async fn forward_to_local(
    http: &reqwest::Client,
    local_port: u16,
    timeout: Duration,
    request_id: String,
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
) -> Frame {
    let decoded_body = match decode_body(&body) {
        Ok(b) => b,
        Err(e) => return status_response(request_id, 502, format!("body decode failed: {e}")),
    };

    let parsed_method = match reqwest::Method::from_bytes(method.as_bytes()) {
        Ok(m) => m,
        Err(_) => return status_response(request_id, 502, format!("invalid method: {method}")),
    };

    let url = format!("http://127.0.0.1:{local_port}{path}");
    let mut req = http.request(parsed_method, &url).body(decoded_body);
    for (name, value) in &headers {
        req = req.header(name, value);
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, req.send()).await {
        Ok(Ok(resp)) => {
            let status = resp.status().as_u16();
            let mut out_headers = HashMap::new();
            for (name, value) in resp.headers() {
                if let Ok(v) = value.to_str() {
                    out_headers.insert(name.as_str().to_string(), v.to_string());
                }
            }
            match resp.bytes().await {
                Ok(bytes) => Frame::Response {
                    request_id,
                    status,
                    headers: out_headers,
                    body: encode_body(&bytes),
                    response_time_ms: Some(elapsed_ms(start)),
                },
                Err(e) => status_response(request_id, 502, format!("body read failed: {e}")),
            }
        }
        Ok(Err(e)) => status_response(request_id, 502, format!("bad gateway: {e}")),
        Err(_) => status_response(request_id, 504, "local service timed out".to_string()),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn status_response(request_id: String, status: u16, message: String) -> Frame {
    Frame::Response {
        request_id,
        status,
        headers: HashMap::new(),
        body: encode_body(message.as_bytes()),
        response_time_ms: None,
    }
}

fn encode_message(frame: &Frame) -> std::result::Result<WsMessage, FrameError> {
    let bytes = frame.encode()?;
    let text = String::from_utf8(bytes).expect("serde_json always produces valid UTF-8");
    Ok(WsMessage::text(text))
}

fn decode_message(msg: WsMessage) -> Result<Option<Frame>> {
    match msg {
        WsMessage::Text(text) => Frame::decode(text.as_bytes())
            .map(Some)
            .map_err(frame_decode_err),
        WsMessage::Binary(bytes) => Frame::decode(&bytes).map(Some).map_err(frame_decode_err),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => Ok(None),
    }
}

fn frame_decode_err(e: FrameError) -> TunnelError {
    TunnelError::MalformedFrame(e.to_string())
}
