//! Shared limits/rate-limit configuration types.
//!
//! The bulk of the configuration surface (`WS_PORT`, `PUBLIC_PORT_START`,
//! etc.) lives in `ferrotunnel::config`, which reads environment variables
//! the way the original `ServerConfig`/`ClientConfig` pair in this workspace
//! always has. This module holds the smaller config fragments shared
//! between `ferrotunnel-core` components.

use serde::{Deserialize, Serialize};

/// Server-side resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent tunnel sessions (`MAX_CLIENTS_PER_SERVER`).
    pub max_sessions: usize,
    /// Idle eviction threshold, in seconds.
    pub idle_threshold_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            idle_threshold_secs: 300,
        }
    }
}

/// Per-IP ingress admission rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window, per remote IP.
    pub requests_per_window: u32,
    /// Window length, in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_secs: 60,
        }
    }
}
