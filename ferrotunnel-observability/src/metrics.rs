//! Process-wide request/connection metrics, exported both as a JSON health
//! snapshot (spec's `GET /health`) and as Prometheus text (`GET /metrics`).
//!
//! Naming follows [Prometheus best practices](https://prometheus.io/docs/practices/naming/):
//! counters end in `_total`, gauges carry no suffix.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

/// Registry backing `ServerMetrics`. Kept separate from the process-global
/// default registry so tests can construct isolated instances.
pub struct ServerMetrics {
    registry: Registry,
    active_connections: IntGauge,
    total_requests: IntCounter,
    failed_requests: IntCounter,
    response_time_sum_ms: Gauge,
    response_time_count: AtomicU64,
    started_at: Instant,
}

impl ServerMetrics {
    /// Creates and registers a fresh metric set. Panics only if Prometheus
    /// metric names collide, which would be a programming error, not a
    /// runtime condition.
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let active_connections =
            IntGauge::new("ferrotunnel_active_connections", "Currently registered tunnel sessions")
                .expect("metric name is valid");
        let total_requests = IntCounter::new(
            "ferrotunnel_requests_total",
            "Total ingress requests admitted",
        )
        .expect("metric name is valid");
        let failed_requests = IntCounter::new(
            "ferrotunnel_requests_failed_total",
            "Ingress requests that ended in 429/502/504",
        )
        .expect("metric name is valid");
        let response_time_sum_ms = Gauge::new(
            "ferrotunnel_response_time_ms_sum",
            "Running sum of successful response times, milliseconds",
        )
        .expect("metric name is valid");

        registry
            .register(Box::new(active_connections.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(total_requests.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(failed_requests.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(response_time_sum_ms.clone()))
            .expect("unique metric name");

        Self {
            registry,
            active_connections,
            total_requests,
            failed_requests,
            response_time_sum_ms,
            response_time_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn set_active_connections(&self, count: usize) {
        self.active_connections.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Records one ingress request that completed with a 2xx/3xx/4xx status
    /// returned by the client's local server (i.e. not a 429/502/504 the
    /// core originated itself).
    pub fn record_success(&self, elapsed: Duration) {
        self.total_requests.inc();
        #[allow(clippy::cast_precision_loss)]
        self.response_time_sum_ms
            .add(elapsed.as_secs_f64() * 1000.0);
        self.response_time_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one ingress request that the core failed out (429/502/504).
    pub fn record_failure(&self) {
        self.total_requests.inc();
        self.failed_requests.inc();
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.get()
    }

    #[must_use]
    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.get()
    }

    #[must_use]
    pub fn average_response_time_ms(&self) -> f64 {
        let count = self.response_time_count.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let avg = self.response_time_sum_ms.get() / count as f64;
            avg
        }
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn active_connections(&self) -> i64 {
        self.active_connections.get()
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .expect("prometheus text encoding never fails");
        String::from_utf8(buffer).expect("prometheus output is always valid UTF-8")
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_response_time_is_zero_with_no_samples() {
        let metrics = ServerMetrics::new();
        assert_eq!(metrics.average_response_time_ms(), 0.0);
    }

    #[test]
    fn records_success_and_failure_counts() {
        let metrics = ServerMetrics::new();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(300));
        metrics.record_failure();

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.failed_requests(), 1);
        assert_eq!(metrics.average_response_time_ms(), 200.0);
    }

    #[test]
    fn gather_emits_prometheus_text() {
        let metrics = ServerMetrics::new();
        metrics.set_active_connections(2);
        let text = metrics.gather();
        assert!(text.contains("ferrotunnel_active_connections"));
    }
}
