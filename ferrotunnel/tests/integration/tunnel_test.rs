//! Happy-path end-to-end tunnel tests (scenario 1).

use super::{make_client, start_echo_server, wait_for_server, TestConfig};
use ferrotunnel::{Client, Server};
use std::time::Duration;

#[tokio::test]
async fn test_server_starts() {
    let config = TestConfig::default();

    let mut server = Server::builder()
        .ws_port(config.ws_port)
        .public_port_range(config.public_port, config.public_port)
        .build()
        .expect("failed to build server");

    let server_handle = tokio::spawn(async move { server.start().await });

    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.ws_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await,
        "server did not start in time"
    );

    server_handle.abort();
}

#[tokio::test]
async fn test_client_connects_and_registers() {
    let config = TestConfig::default();
    let _echo = start_echo_server(config.local_port).await;

    let mut server = Server::builder()
        .ws_port(config.ws_port)
        .public_port_range(config.public_port, config.public_port)
        .build()
        .expect("failed to build server");
    let _server_handle = tokio::spawn(async move {
        let _ = server.start().await;
    });

    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.ws_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );

    let mut client = Client::builder()
        .server_url(config.server_url())
        .local_port(config.local_port)
        .build()
        .expect("failed to build client");

    client.start().await.expect("client failed to start");

    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.public_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await,
        "tunnel ingress listener never came up"
    );

    let _ = client.shutdown().await;
}

/// Scenario 1: a `GET /foo?x=1` hitting the public ingress port is forwarded
/// to the client's local service, and the response body round-trips back.
#[tokio::test]
async fn test_http_through_tunnel() {
    let config = TestConfig::default();
    let _echo = start_echo_server(config.local_port).await;

    let mut server = Server::builder()
        .ws_port(config.ws_port)
        .public_port_range(config.public_port, config.public_port)
        .build()
        .expect("failed to build server");
    let _server_handle = tokio::spawn(async move {
        let _ = server.start().await;
    });

    assert!(
        wait_for_server(
            format!("127.0.0.1:{}", config.ws_port).parse().unwrap(),
            Duration::from_secs(5)
        )
        .await
    );

    let mut client = Client::builder()
        .server_url(config.server_url())
        .local_port(config.local_port)
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
    let url = format!("http://127.0.0.1:{}/foo?x=1", config.public_port);
    let response = http_client.get(&url).send().await.expect("request failed");

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, "Hello, World!");

    let _ = client.shutdown().await;
}
