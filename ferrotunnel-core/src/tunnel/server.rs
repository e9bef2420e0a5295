//! Control channel: accepts WebSocket connections, drives each session's
//! register handshake, and relays `response`/`ping` traffic to the pending
//! registry.
//!
//! Per-tunnel HTTP ingress (component D) lives in `ferrotunnel-http`, which
//! depends on this crate — not the other way around — so a registered
//! session's listener is started through the [`IngressSpawner`] hook
//! rather than a direct call, keeping the dependency graph acyclic the way
//! the teacher's plugin registry decouples `ferrotunnel-core` from
//! higher-level crates.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ferrotunnel_common::TunnelError;
use ferrotunnel_observability::ServerMetrics;
use ferrotunnel_protocol::{codec, Frame};

use super::registry::TunnelRegistry;
use super::session::{Session, SessionId, SessionState};
use crate::pending::PendingRegistry;
use crate::port::PortAllocator;

/// Hook through which a registered session's HTTP ingress listener is
/// started. Implemented by `ferrotunnel-http::ingress::HttpIngressSpawner`.
pub trait IngressSpawner: Send + Sync {
    fn spawn_ingress(&self, session: Arc<Session>) -> JoinHandle<()>;
}

/// What happened to a tunnel session, for the connection event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Close,
}

/// External collaborator for connection-open/close notifications. Failures
/// must never block session progress — the default implementation simply
/// logs and cannot fail.
pub trait ConnectionEventSink: Send + Sync {
    fn log_connection(
        &self,
        client_id: SessionId,
        public_port: Option<u16>,
        local_port: Option<u16>,
        action: ConnectionEvent,
    );
}

/// Default sink: structured logging only.
pub struct TracingEventSink;

impl ConnectionEventSink for TracingEventSink {
    fn log_connection(
        &self,
        client_id: SessionId,
        public_port: Option<u16>,
        local_port: Option<u16>,
        action: ConnectionEvent,
    ) {
        info!(%client_id, ?public_port, ?local_port, ?action, "connection event");
    }
}

/// Shared state behind every control-channel connection.
pub struct ServerState {
    pub registry: Arc<TunnelRegistry>,
    pub ports: Arc<PortAllocator>,
    pub pending: Arc<PendingRegistry>,
    pub ingress_spawner: Arc<dyn IngressSpawner>,
    pub event_sink: Arc<dyn ConnectionEventSink>,
    pub metrics: Arc<ServerMetrics>,
    pub server_id: String,
}

/// Builds the `/ws` control-channel route. Mount alongside the
/// health/metrics router on the same listener (spec's "control listener
/// host").
#[must_use]
pub fn ws_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: Arc<ServerState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);

    // Single-writer discipline: only this task ever calls ws_tx.send, so
    // outbound frames can never interleave mid-message.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match codec::encode(&frame) {
                Ok(msg) => {
                    if ws_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode outbound frame"),
            }
        }
    });

    let session = Session::new(outbound_tx, addr);
    info!(session = %session.id, %addr, "control channel connected");

    let mut ingress_handle: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            next = ws_rx.next() => {
                let Some(msg) = next else { break };
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(session = %session.id, error = %e, "control channel read error");
                        break;
                    }
                };

                let frame = match codec::decode(msg) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(session = %session.id, error = %e, "malformed control-channel frame, ignoring");
                        continue;
                    }
                };

                handle_frame(&state, &session, frame, &mut ingress_handle).await;
            }
            () = session.cancelled() => {
                info!(session = %session.id, "session cancelled, closing control channel");
                break;
            }
        }
    }

    teardown(&state, &session, ingress_handle).await;
    writer.abort();
}

async fn handle_frame(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    frame: Frame,
    ingress_handle: &mut Option<JoinHandle<()>>,
) {
    match session.state() {
        SessionState::Connected => match frame {
            Frame::Register { local_port } => {
                handle_register(state, session, local_port, ingress_handle).await;
            }
            other => {
                warn!(session = %session.id, frame = other.type_name(), "message before register, rejecting");
                let _ = session
                    .send(Frame::Error {
                        message: "expected register as the first message".to_string(),
                    })
                    .await;
            }
        },
        _ => match frame {
            Frame::Register { .. } => {
                warn!(session = %session.id, "duplicate register on an already-registered session, ignoring");
            }
            Frame::Response { ref request_id, .. } => {
                if state.pending.complete(request_id, &frame) {
                    session.touch();
                }
            }
            Frame::Ping { .. } => {
                session.touch();
                let _ = session.send(Frame::Pong).await;
            }
            Frame::Pong => {
                session.touch();
            }
            Frame::Error { message } => {
                warn!(session = %session.id, %message, "client reported error");
            }
            other => {
                warn!(session = %session.id, frame = other.type_name(), "unexpected frame, ignoring");
            }
        },
    }
}

async fn handle_register(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    local_port: u16,
    ingress_handle: &mut Option<JoinHandle<()>>,
) {
    if local_port == 0 {
        let _ = session
            .send(Frame::Error {
                message: "local_port must be in [1, 65535]".to_string(),
            })
            .await;
        return;
    }

    if state.registry.count() >= state.registry.max_clients() {
        let _ = session
            .send(Frame::Error {
                message: "Server at capacity".to_string(),
            })
            .await;
        return;
    }

    let public_port = match state.ports.acquire().await {
        Ok(p) => p,
        Err(TunnelError::PortsExhausted) => {
            let _ = session
                .send(Frame::Error {
                    message: "No free public ports".to_string(),
                })
                .await;
            return;
        }
        Err(_) => {
            let _ = session
                .send(Frame::Error {
                    message: "Internal allocation error".to_string(),
                })
                .await;
            return;
        }
    };

    session.set_local_port(local_port);
    session.set_public_port(public_port);

    if let Err(e) = state.registry.insert(session.clone()) {
        state.ports.release(public_port);
        let message = match e {
            TunnelError::AtCapacity => "Server at capacity".to_string(),
            other => other.to_string(),
        };
        let _ = session.send(Frame::Error { message }).await;
        return;
    }

    session.set_state(SessionState::Registered);
    session.touch();
    state.metrics.set_active_connections(state.registry.count());
    *ingress_handle = Some(state.ingress_spawner.spawn_ingress(session.clone()));
    state.event_sink.log_connection(
        session.id,
        Some(public_port),
        Some(local_port),
        ConnectionEvent::Open,
    );

    let _ = session
        .send(Frame::Registered {
            public_port,
            server_id: state.server_id.clone(),
        })
        .await;
}

/// Teardown ordering per the session state machine: registry removal first,
/// control channel close last.
async fn teardown(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    ingress_handle: Option<JoinHandle<()>>,
) {
    session.set_state(SessionState::Draining);

    // 1. Remove from the registry so no new ingress admission resolves it.
    state.registry.remove(session.id);
    state.metrics.set_active_connections(state.registry.count());

    // 2. Stop accepting new ingress connections for this tunnel.
    if let Some(handle) = ingress_handle {
        handle.abort();
    }

    // 3. Fail all pending entries owned by this session.
    state.pending.drain_owned_by(session.id);

    // 4. Release the public port.
    if let Some(port) = session.public_port() {
        state.ports.release(port);
    }

    state.event_sink.log_connection(
        session.id,
        session.public_port(),
        session.local_port(),
        ConnectionEvent::Close,
    );
    session.set_state(SessionState::Closed);
    info!(session = %session.id, "control channel closed");

    // 5. The control channel itself closes when the writer task's sender
    // is dropped along with `session`.
}
