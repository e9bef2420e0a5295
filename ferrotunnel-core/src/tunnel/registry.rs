//! Process-wide index of active tunnel sessions, by client id and by public
//! port, with capacity enforcement and idle eviction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use ferrotunnel_common::{Result, TunnelError};

use super::session::{Session, SessionId};

/// `insert`/`remove`/`by_port`/`count`, keeping both indexes consistent
/// under DashMap's per-shard locking. `insert` and `remove` each touch both
/// maps; since a session's `public_port` is fixed before insertion and
/// never mutated in place, there is no window where the two indexes can
/// disagree about a live session.
pub struct TunnelRegistry {
    by_id: DashMap<SessionId, Arc<Session>>,
    by_port: DashMap<u16, SessionId>,
    max_clients: usize,
}

impl TunnelRegistry {
    #[must_use]
    pub fn new(max_clients: usize) -> Self {
        Self {
            by_id: DashMap::new(),
            by_port: DashMap::new(),
            max_clients,
        }
    }

    /// Insert a newly registered session. Rejected at capacity with
    /// `AtCapacity`, before any port has been leased for the caller.
    pub fn insert(&self, session: Arc<Session>) -> Result<()> {
        if self.by_id.len() >= self.max_clients {
            return Err(TunnelError::AtCapacity);
        }
        if let Some(port) = session.public_port() {
            self.by_port.insert(port, session.id);
        }
        self.by_id.insert(session.id, session);
        Ok(())
    }

    /// Remove a session from both indexes. Idempotent.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let (_, session) = self.by_id.remove(&id)?;
        if let Some(port) = session.public_port() {
            self.by_port.remove(&port);
        }
        Some(session)
    }

    #[must_use]
    pub fn by_port(&self, port: u16) -> Option<Arc<Session>> {
        let id = *self.by_port.get(&port)?;
        self.by_id.get(&id).map(|r| r.clone())
    }

    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.by_id.get(&id).map(|r| r.clone())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// All live sessions, for the eviction sweep and health/metrics.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.by_id.iter().map(|r| r.value().clone()).collect()
    }
}

/// Runs forever, signalling sessions idle beyond `idle_threshold` roughly
/// every `sweep_interval` to close. The session's own control loop runs the
/// actual teardown (port release, ingress abort, pending drain, de-index)
/// once it observes the cancellation; this sweep only flags candidates, it
/// never removes anything itself. Only logs when it actually evicts
/// something — a quiet sweep is not worth a log line.
pub async fn run_idle_eviction_sweep(
    registry: Arc<TunnelRegistry>,
    idle_threshold: Duration,
    sweep_interval: Duration,
) {
    let mut ticker = tokio::time::interval(sweep_interval);
    loop {
        ticker.tick().await;
        let mut evicted = 0usize;
        for session in registry.sessions() {
            if session.idle_for_secs() >= idle_threshold.as_secs() {
                session.cancel();
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "idle eviction sweep signalled stale sessions to close");
        }
    }
}
