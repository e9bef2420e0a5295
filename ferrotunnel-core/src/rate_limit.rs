//! Per-IP ingress admission rate limiting.
//!
//! A fixed window of `requests_per_window` requests per `window_secs` per
//! remote IP, backed by a pluggable [`RateLimitStore`]. The default,
//! in-process store fails open by construction: the external counter store
//! the design notes mention (a cache, a distributed limiter) is modeled as
//! a trait so a future store-backed implementation can return `Err` and
//! have callers treat that as *allow*, exactly as the fail-open rationale
//! requires.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

use ferrotunnel_common::config::RateLimitConfig;

/// A per-IP admission check. `check(ip)` returns whether the request is
/// admitted. Implementations that depend on an external store should
/// fail open (return `true`) rather than propagate an error, per the
/// rate-limiting design rationale.
pub trait RateLimitStore: Send + Sync {
    fn check(&self, ip: IpAddr) -> bool;
}

/// In-process, `governor`-backed keyed rate limiter. Never fails: the
/// store is entirely local memory, so there is no external dependency to
/// fail open against, but the trait boundary is kept so a networked
/// implementation can be swapped in without touching callers.
pub struct GovernorRateLimitStore {
    limiter: Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>,
}

impl GovernorRateLimitStore {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_sec = (config.requests_per_window as f64 / config.window_secs as f64).ceil();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let per_sec = NonZeroU32::new((per_sec as u32).max(1)).unwrap_or(NonZeroU32::MIN);
        let burst =
            NonZeroU32::new(config.requests_per_window.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_sec).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }
}

impl RateLimitStore for GovernorRateLimitStore {
    fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Admission gate combining a [`RateLimitStore`] with the fail-open
/// policy: any implementation error (panics aside) is treated as *allow*.
#[derive(Clone)]
pub struct IngressAdmission {
    store: Arc<dyn RateLimitStore>,
}

impl IngressAdmission {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            store: Arc::new(GovernorRateLimitStore::new(config)),
        }
    }

    #[must_use]
    pub fn with_store(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Returns `true` if the request from `ip` should be admitted.
    #[must_use]
    pub fn admit(&self, ip: IpAddr) -> bool {
        self.store.check(ip)
    }
}

impl std::fmt::Debug for IngressAdmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressAdmission").finish_non_exhaustive()
    }
}
