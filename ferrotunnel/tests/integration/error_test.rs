//! Error scenario integration tests (scenarios 2-5).

use super::{make_client, start_echo_server, start_stalling_server, wait_for_server, TestConfig};
use ferrotunnel::{Client, Server};
use ferrotunnel_core::TunnelClient;
use std::time::Duration;

async fn start_server(config: &TestConfig, max_clients: usize, request_timeout: Duration) -> tokio::task::JoinHandle<()> {
    let mut server = Server::builder()
        .ws_port(config.ws_port)
        .public_port_range(config.public_port, config.public_port)
        .max_clients(max_clients)
        .request_timeout(request_timeout)
        .build()
        .expect("failed to build server");
    let handle = tokio::spawn(async move {
        let _ = server.start().await;
    });
    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.ws_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );
    handle
}

/// Scenario 2: with `MAX_CLIENTS=1` and one session active, a second
/// client's register is rejected and no port is leased.
#[tokio::test]
async fn test_registration_rejected_at_capacity() {
    let config = TestConfig::default();
    let _echo = start_echo_server(config.local_port).await;
    let _server_handle = start_server(&config, 1, Duration::from_secs(30)).await;

    let mut first = Client::builder()
        .server_url(config.server_url())
        .local_port(config.local_port)
        .build()
        .expect("failed to build client");
    first.start().await.expect("first client should register");
    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.public_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );

    let second = TunnelClient::new(config.server_url(), config.local_port);
    let err = second.connect_and_run().await.unwrap_err();
    assert!(
        err.to_string().contains("Server at capacity") || err.to_string().contains("at capacity"),
        "unexpected error: {err}"
    );

    let _ = first.shutdown().await;
}

/// Scenario 3: a one-wide public port range with the only port already
/// leased rejects the second registration.
#[tokio::test]
async fn test_registration_rejected_port_exhaustion() {
    let config = TestConfig::default();
    let _echo = start_echo_server(config.local_port).await;
    let _server_handle = start_server(&config, 100, Duration::from_secs(30)).await;

    let mut first = Client::builder()
        .server_url(config.server_url())
        .local_port(config.local_port)
        .build()
        .expect("failed to build client");
    first.start().await.expect("first client should register");
    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.public_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );

    let second = TunnelClient::new(config.server_url(), config.local_port);
    let err = second.connect_and_run().await.unwrap_err();
    assert!(
        err.to_string().contains("No free public ports"),
        "unexpected error: {err}"
    );

    let _ = first.shutdown().await;
}

/// Scenario 4: the client never replies to a forwarded request; after
/// `REQUEST_TIMEOUT` the ingress returns `504` and the pending entry is
/// gone (a later late response is silently dropped, not asserted here).
#[tokio::test]
async fn test_upstream_timeout_returns_504() {
    let config = TestConfig::default();
    let _stalling = start_stalling_server(config.local_port).await;
    let _server_handle = start_server(&config, 100, Duration::from_millis(300)).await;

    let mut client = Client::builder()
        .server_url(config.server_url())
        .local_port(config.local_port)
        .request_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build client");
    client.start().await.expect("client failed to start");
    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.public_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );

    let http_client = make_client();
    let url = format!("http://127.0.0.1:{}/", config.public_port);
    let response = http_client
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 504);

    let _ = client.shutdown().await;
}

/// Scenario 5: the control channel closes while requests are in flight;
/// both ingress responses come back `502` and the session is gone.
#[tokio::test]
async fn test_channel_close_fails_inflight_requests() {
    let config = TestConfig::default();
    let _stalling = start_stalling_server(config.local_port).await;
    let _server_handle = start_server(&config, 100, Duration::from_secs(30)).await;

    let mut client = Client::builder()
        .server_url(config.server_url())
        .local_port(config.local_port)
        .auto_reconnect(false)
        .build()
        .expect("failed to build client");
    client.start().await.expect("client failed to start");
    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.public_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );

    let public_port = config.public_port;
    let a = tokio::spawn(async move {
        let url = format!("http://127.0.0.1:{public_port}/a");
        make_client()
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
    });
    let b = tokio::spawn(async move {
        let url = format!("http://127.0.0.1:{public_port}/b");
        make_client()
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
    });

    // Let both requests reach the pending registry before the channel dies.
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.stop();

    let (resp_a, resp_b) = tokio::join!(a, b);
    assert_eq!(resp_a.unwrap().expect("request failed").status(), 502);
    assert_eq!(resp_b.unwrap().expect("request failed").status(), 502);
}
