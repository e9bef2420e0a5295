#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for `FerroTunnel`
//!
//! End-to-end coverage of the six concrete scenarios named for the tunnel
//! multiplexer: happy path, capacity, port exhaustion, upstream timeout,
//! channel close mid-flight, and concurrent multiplexing.

mod concurrent_test;
mod error_test;
mod tunnel_test;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::sleep;

static NEXT_PORT: std::sync::atomic::AtomicU16 = std::sync::atomic::AtomicU16::new(31000);

/// A free, OS-bindable port on localhost. The tunnel's ingress port and the
/// local service's port both come from this pool so every test runs on its
/// own, non-colliding slice of the port space.
pub fn get_free_port() -> u16 {
    use std::sync::atomic::Ordering;
    loop {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
    }
}

/// One test's worth of addressing: a single-port public range so the
/// allocated `public_port` is deterministic, plus a local service port.
pub struct TestConfig {
    pub ws_port: u16,
    pub public_port: u16,
    pub local_port: u16,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            ws_port: get_free_port(),
            public_port: get_free_port(),
            local_port: get_free_port(),
        }
    }
}

impl TestConfig {
    pub fn server_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.ws_port)
    }
}

/// Wait for a TCP listener to come up.
pub async fn wait_for_server(addr: SocketAddr, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

pub fn make_client() -> reqwest::Client {
    reqwest::Client::new()
}

/// A local HTTP service that always replies `200 Hello, World!`.
pub async fn start_echo_server(port: u16) -> tokio::task::JoinHandle<()> {
    start_local_service(port, |_request| async { canned_response(200, "Hello, World!") }).await
}

/// A local HTTP service that accepts the connection and never writes a
/// response, used to drive the upstream-timeout and channel-close
/// scenarios.
pub async fn start_stalling_server(port: u16) -> tokio::task::JoinHandle<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind stalling server");
    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    sleep(Duration::from_secs(60)).await;
                });
            }
        }
    })
}

/// A local HTTP service whose response delay is controlled by a
/// `?delay_ms=N` query parameter, for exercising out-of-order completion
/// of concurrently in-flight requests.
pub async fn start_variable_delay_server(port: u16) -> tokio::task::JoinHandle<()> {
    start_local_service(port, |request| async move {
        let delay_ms = request
            .split("delay_ms=")
            .nth(1)
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|digits| digits.parse::<u64>().ok())
            .unwrap_or(0);
        sleep(Duration::from_millis(delay_ms)).await;
        canned_response(200, &format!("delayed {delay_ms}"))
    })
    .await
}

async fn start_local_service<F, Fut>(port: u16, respond: F) -> tokio::task::JoinHandle<()>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = String> + Send,
{
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind local service");
    let respond = std::sync::Arc::new(respond);
    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let body = respond(request).await;
                    let _ = socket.write_all(body.as_bytes()).await;
                });
            }
        }
    })
}

fn canned_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        _ => "Unknown",
    };
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}
