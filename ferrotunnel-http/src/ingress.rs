//! Per-tunnel HTTP ingress (component D): one listener per registered
//! session, bound to its allocated `public_port`, translating each inbound
//! request into a control-channel `request` frame and awaiting the
//! correlated `response` frame.
//!
//! Implements [`ferrotunnel_core::tunnel::server::IngressSpawner`] so the
//! control-channel driver in `ferrotunnel-core` never depends on this
//! crate directly.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ferrotunnel_core::pending::PendingOutcome;
use ferrotunnel_core::rate_limit::IngressAdmission;
use ferrotunnel_core::tunnel::server::IngressSpawner;
use ferrotunnel_core::tunnel::Session;
use ferrotunnel_core::PendingRegistry;
use ferrotunnel_observability::ServerMetrics;
use ferrotunnel_protocol::{decode_body, encode_body, Frame};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Hop-by-hop headers stripped from the response before it reaches the
/// original requester (spec §4.D step 6).
const HOP_BY_HOP: &[&str] = &["transfer-encoding", "content-length", "content-encoding", "connection"];

/// Binds and serves one session's public-port ingress listener.
pub struct HttpIngressSpawner {
    pending: Arc<PendingRegistry>,
    admission: Arc<IngressAdmission>,
    metrics: Arc<ServerMetrics>,
    request_timeout: Duration,
}

impl HttpIngressSpawner {
    #[must_use]
    pub fn new(
        pending: Arc<PendingRegistry>,
        admission: Arc<IngressAdmission>,
        metrics: Arc<ServerMetrics>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            pending,
            admission,
            metrics,
            request_timeout,
        }
    }
}

impl IngressSpawner for HttpIngressSpawner {
    fn spawn_ingress(&self, session: Arc<Session>) -> JoinHandle<()> {
        let pending = self.pending.clone();
        let admission = self.admission.clone();
        let metrics = self.metrics.clone();
        let request_timeout = self.request_timeout;
        tokio::spawn(async move {
            run_listener(session, pending, admission, metrics, request_timeout).await;
        })
    }
}

async fn run_listener(
    session: Arc<Session>,
    pending: Arc<PendingRegistry>,
    admission: Arc<IngressAdmission>,
    metrics: Arc<ServerMetrics>,
    request_timeout: Duration,
) {
    let Some(port) = session.public_port() else {
        error!(session = %session.id, "ingress spawned without a leased public port");
        return;
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(session = %session.id, %port, error = %e, "failed to bind ingress listener");
            return;
        }
    };
    info!(session = %session.id, %port, "ingress listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(session = %session.id, error = %e, "ingress accept failed");
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let session_id = session.id;
        let session = session.clone();
        let pending = pending.clone();
        let admission = admission.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                handle_request(
                    req,
                    peer,
                    session.clone(),
                    pending.clone(),
                    admission.clone(),
                    metrics.clone(),
                    request_timeout,
                )
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(session = %session_id, error = %err, "ingress connection ended");
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    session: Arc<Session>,
    pending: Arc<PendingRegistry>,
    admission: Arc<IngressAdmission>,
    metrics: Arc<ServerMetrics>,
    request_timeout: Duration,
) -> Result<Response<BoxBody>, hyper::Error> {
    // Step 1: admission. Rejected requests never allocate a request_id.
    if !admission.admit(peer.ip()) {
        return Ok(status_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"));
    }

    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(ToString::to_string)
        .unwrap_or_else(|| "/".to_string());
    let mut headers = HashMap::new();
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_string(), v.to_string());
        }
    }

    // Step 2: fully buffer the body.
    let body_bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            metrics.record_failure();
            return Ok(status_response(
                StatusCode::BAD_GATEWAY,
                &format!("failed to read request body: {e}"),
            ));
        }
    };

    // Step 3-4: mint request_id, register a pending completion handle, and
    // enqueue the frame on the session's control channel.
    let request_id = Uuid::new_v4().to_string();
    let rx = pending.register(request_id.clone(), session.id);

    let frame = Frame::Request {
        request_id: request_id.clone(),
        method,
        path,
        headers,
        body: encode_body(&body_bytes),
        client_ip: peer.ip().to_string(),
        timestamp: now_epoch_secs(),
    };

    if !session.send(frame).await {
        pending.remove(&request_id);
        metrics.record_failure();
        return Ok(status_response(StatusCode::BAD_GATEWAY, "tunnel channel is closed"));
    }

    // Step 5: await the response, or time out.
    let start = Instant::now();
    match tokio::time::timeout(request_timeout, rx).await {
        Ok(Ok(PendingOutcome::Response { status, headers, body })) => {
            metrics.record_success(start.elapsed());
            Ok(build_response(status, &headers, &body))
        }
        Ok(Ok(PendingOutcome::ChannelClosed)) => {
            metrics.record_failure();
            Ok(status_response(StatusCode::BAD_GATEWAY, "tunnel channel closed before responding"))
        }
        Ok(Ok(PendingOutcome::UpstreamError(message))) => {
            metrics.record_failure();
            Ok(status_response(StatusCode::BAD_GATEWAY, &message))
        }
        Ok(Err(_recv_error)) => {
            metrics.record_failure();
            Ok(status_response(StatusCode::BAD_GATEWAY, "response handle dropped"))
        }
        Err(_elapsed) => {
            pending.remove(&request_id);
            metrics.record_failure();
            Ok(status_response(StatusCode::GATEWAY_TIMEOUT, "upstream did not respond in time"))
        }
    }
}

fn build_response(status: u16, headers: &HashMap<String, String>, body: &[u8]) -> Response<BoxBody> {
    let mut builder = Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(full_body(Bytes::copy_from_slice(body)))
        .unwrap_or_else(|_| status_response(StatusCode::BAD_GATEWAY, "malformed upstream headers"))
}

fn status_response(status: StatusCode, message: &str) -> Response<BoxBody> {
    #[allow(clippy::unwrap_used)]
    Response::builder()
        .status(status)
        .body(full_body(Bytes::copy_from_slice(message.as_bytes())))
        .unwrap()
}

fn full_body(bytes: Bytes) -> BoxBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
