//! Pending-request registry: maps a `request_id` to a single-fire
//! completion handle.
//!
//! A late response (arriving after the entry has been resolved or drained)
//! is dropped silently — `complete` and `fail` on an unknown or
//! already-resolved id are no-ops, never forwarded to a newer request with
//! the same id.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::tunnel::session::SessionId;
use ferrotunnel_protocol::Frame;

/// Outcome delivered to an ingress task awaiting a response.
#[derive(Debug)]
pub enum PendingOutcome {
    Response {
        status: u16,
        headers: std::collections::HashMap<String, String>,
        body: Vec<u8>,
    },
    ChannelClosed,
    UpstreamError(String),
}

/// A single pending request's ownership record, used by `drain` to fail
/// only the entries owned by a closing session.
struct Entry {
    owner: SessionId,
    tx: oneshot::Sender<PendingOutcome>,
}

/// Process-wide map from `request_id` to its completion handle.
#[derive(Default)]
pub struct PendingRegistry {
    entries: DashMap<String, Entry>,
}

impl PendingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh `request_id`, returning the receiver half the
    /// ingress task awaits.
    pub fn register(
        &self,
        request_id: String,
        owner: SessionId,
    ) -> oneshot::Receiver<PendingOutcome> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(request_id, Entry { owner, tx });
        rx
    }

    /// Resolve `request_id` with a decoded response frame. Returns `true`
    /// if a waiter was present and resolved; `false` for an unknown or
    /// already-resolved id (the late-response case).
    pub fn complete(&self, request_id: &str, frame: &Frame) -> bool {
        let Frame::Response {
            status,
            headers,
            body,
            ..
        } = frame
        else {
            return false;
        };
        let Some((_, entry)) = self.entries.remove(request_id) else {
            return false;
        };
        let outcome = match ferrotunnel_protocol::decode_body(body) {
            Ok(bytes) => PendingOutcome::Response {
                status: *status,
                headers: headers.clone(),
                body: bytes,
            },
            Err(e) => PendingOutcome::UpstreamError(format!("body decode failed: {e}")),
        };
        entry.tx.send(outcome).is_ok()
    }

    /// Resolve `request_id` with an explicit failure (e.g. timeout removes
    /// the entry itself before calling this, so this is mainly used for
    /// channel-close draining).
    pub fn fail(&self, request_id: &str, outcome: PendingOutcome) -> bool {
        let Some((_, entry)) = self.entries.remove(request_id) else {
            return false;
        };
        entry.tx.send(outcome).is_ok()
    }

    /// Remove an entry without resolving it (used by the timeout path,
    /// which sends its own `UpstreamTimeout` response to the ingress task
    /// directly via the receiver's `Err`).
    pub fn remove(&self, request_id: &str) {
        self.entries.remove(request_id);
    }

    /// Fail every entry owned by `owner` with `ChannelClosed`, used during
    /// session teardown (§4.E step 3).
    pub fn drain_owned_by(&self, owner: SessionId) {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.key().clone())
            .collect();
        for id in ids {
            self.fail(&id, PendingOutcome::ChannelClosed);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
