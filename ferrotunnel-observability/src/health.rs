//! `GET /health` and `GET /metrics`, mounted on the control-listener host
//! alongside the WebSocket control channel (spec §6).

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::metrics::ServerMetrics;

/// Collaborators the health/metrics endpoints need beyond raw counters:
/// the server's identity and the port allocator's utilization.
pub trait PortUtilization: Send + Sync {
    /// Leased ports divided by the configured range size, in `[0.0, 1.0]`.
    fn port_utilization(&self) -> f64;
}

pub struct HealthState {
    pub server_id: String,
    pub metrics: Arc<ServerMetrics>,
    pub ports: Arc<dyn PortUtilization>,
}

#[derive(Serialize)]
struct HealthBody {
    server_id: String,
    active_connections: i64,
    uptime_secs: u64,
    total_requests: u64,
    failed_requests: u64,
    average_response_time_ms: f64,
}

#[derive(Serialize)]
struct MetricsBody {
    #[serde(flatten)]
    health: HealthBody,
    port_utilization: f64,
}

#[must_use]
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .with_state(state)
}

fn health_body(state: &HealthState) -> HealthBody {
    HealthBody {
        server_id: state.server_id.clone(),
        active_connections: state.metrics.active_connections(),
        uptime_secs: state.metrics.uptime().as_secs(),
        total_requests: state.metrics.total_requests(),
        failed_requests: state.metrics.failed_requests(),
        average_response_time_ms: state.metrics.average_response_time_ms(),
    }
}

async fn health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(health_body(&state))
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(MetricsBody {
        health: health_body(&state),
        port_utilization: state.ports.port_utilization(),
    })
}

async fn metrics_prometheus(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
}
