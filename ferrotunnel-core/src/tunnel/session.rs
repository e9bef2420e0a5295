//! One client's tunnel attachment: control channel, port lease, and ingress
//! listener, driven through the Connected → Registered → Draining → Closed
//! state machine.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};
use uuid::Uuid;

use ferrotunnel_protocol::Frame;

/// Opaque 128-bit client identifier, minted on control-channel accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a [`Session`], per the tunnel session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Channel open, no port leased; only `register` is honored.
    Connected,
    /// Ingress listener up; accepts `response`/`ping`.
    Registered,
    /// No new ingress accepted; in-flight work is being failed out.
    Draining,
    /// Removed from the registry.
    Closed,
}

/// One client's tunnel attachment.
pub struct Session {
    pub id: SessionId,
    /// Sender half the control-channel writer task drains; outbound frames
    /// are serialized through this single queue (the single-writer
    /// discipline the control channel requires).
    pub outbound: mpsc::Sender<Frame>,
    pub remote_addr: SocketAddr,
    /// 0 means "not yet set"; real ports are always >= 1.
    local_port: std::sync::atomic::AtomicU32,
    public_port: std::sync::atomic::AtomicU32,
    created_at: u64,
    last_activity: AtomicU64,
    state: std::sync::Mutex<SessionState>,
    /// Fired to make the control loop (`handle_socket`) tear itself down,
    /// e.g. from the idle eviction sweep running on a different task.
    cancel: Notify,
}

impl Session {
    #[must_use]
    pub fn new(outbound: mpsc::Sender<Frame>, remote_addr: SocketAddr) -> Arc<Self> {
        let now = now_secs();
        Arc::new(Self {
            id: SessionId::new(),
            outbound,
            remote_addr,
            local_port: std::sync::atomic::AtomicU32::new(0),
            public_port: std::sync::atomic::AtomicU32::new(0),
            created_at: now,
            last_activity: AtomicU64::new(now),
            state: std::sync::Mutex::new(SessionState::Connected),
            cancel: Notify::new(),
        })
    }

    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        match self.local_port.load(Ordering::Relaxed) {
            0 => None,
            p => Some(p as u16),
        }
    }

    pub fn set_local_port(&self, port: u16) {
        self.local_port.store(u32::from(port), Ordering::Relaxed);
    }

    #[must_use]
    pub fn public_port(&self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        match self.public_port.load(Ordering::Relaxed) {
            0 => None,
            p => Some(p as u16),
        }
    }

    pub fn set_public_port(&self, port: u16) {
        self.public_port.store(u32::from(port), Ordering::Relaxed);
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, state: SessionState) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *guard != state {
            info!(session = %self.id, from = ?*guard, to = ?state, "session state transition");
        }
        *guard = state;
    }

    pub fn touch(&self) {
        self.last_activity.store(now_secs(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn idle_for_secs(&self) -> u64 {
        now_secs().saturating_sub(self.last_activity.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Request that this session's control loop close and tear down, e.g.
    /// because the idle eviction sweep found it past `idle_threshold`.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    /// Resolves once [`cancel()`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.cancel.notified().await;
    }

    /// Enqueue a frame for delivery on this session's control channel.
    /// Returns `false` if the channel has already been torn down.
    pub async fn send(&self, frame: Frame) -> bool {
        if self.outbound.send(frame).await.is_err() {
            warn!(session = %self.id, "attempted send on closed control channel");
            false
        } else {
            true
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:1234".parse().unwrap()
    }

    #[tokio::test]
    async fn new_session_starts_connected() {
        let (tx, _rx) = mpsc::channel(8);
        let session = Session::new(tx, addr());
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.public_port().is_none());
    }

    #[tokio::test]
    async fn public_port_setter_round_trips() {
        let (tx, _rx) = mpsc::channel(8);
        let session = Session::new(tx, addr());
        session.set_public_port(5000);
        assert_eq!(session.public_port(), Some(5000));
    }

    #[tokio::test]
    async fn touch_resets_idle_duration() {
        let (tx, _rx) = mpsc::channel(8);
        let session = Session::new(tx, addr());
        session.touch();
        assert_eq!(session.idle_for_secs(), 0);
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let session = Session::new(tx, addr());
        drop(rx);
        assert!(!session.send(Frame::Pong).await);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[tokio::test]
    async fn cancel_wakes_a_waiting_cancelled_call() {
        let (tx, _rx) = mpsc::channel(8);
        let session = Session::new(tx, addr());
        session.cancel();
        // notify_one stores a permit, so this resolves even though cancel()
        // ran before anyone awaited cancelled().
        tokio::time::timeout(std::time::Duration::from_millis(100), session.cancelled())
            .await
            .expect("cancelled() should resolve immediately");
    }
}
