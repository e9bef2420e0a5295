//! Concurrency integration tests (scenario 6: concurrent multiplexing).

use super::{make_client, start_variable_delay_server, wait_for_server, TestConfig};
use ferrotunnel::{Client, Server};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

/// Many concurrent requests through a single tunnel should all succeed;
/// no request blocks another.
#[tokio::test]
async fn test_concurrent_requests_all_succeed() {
    let config = TestConfig::default();
    let _local = start_variable_delay_server(config.local_port).await;

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

    let success_count = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for i in 0..50 {
        let public_port = config.public_port;
        let counter = success_count.clone();
        handles.push(tokio::spawn(async move {
            let http_client = make_client();
            let url = format!("http://127.0.0.1:{public_port}/?req={i}&delay_ms=10");
            if let Ok(resp) = http_client.get(&url).send().await {
                if resp.status() == 200 {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    assert_eq!(success_count.load(Ordering::Relaxed), 50, "all 50 requests should succeed");

    let _ = client.shutdown().await;
}

/// Scenario 6: two simultaneous ingress requests A (slow) and B (fast); the
/// client answers B first. B's ingress response must arrive before A's.
#[tokio::test]
async fn test_concurrent_requests_complete_out_of_order() {
    let config = TestConfig::default();
    let _local = start_variable_delay_server(config.local_port).await;

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

    let completion_order: Arc<tokio::sync::Mutex<Vec<&'static str>>> =
        Arc::new(tokio::sync::Mutex::new(Vec::new()));

    let order_a = completion_order.clone();
    let public_port = config.public_port;
    let slow = tokio::spawn(async move {
        let url = format!("http://127.0.0.1:{public_port}/a?delay_ms=300");
        let resp = make_client().get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        order_a.lock().await.push("A");
    });

    // Give A a head start so it is strictly in-flight before B is sent.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let order_b = completion_order.clone();
    let fast = tokio::spawn(async move {
        let url = format!("http://127.0.0.1:{public_port}/b?delay_ms=10");
        let resp = make_client().get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        order_b.lock().await.push("B");
    });

    let _ = tokio::join!(slow, fast);

    let order = completion_order.lock().await;
    assert_eq!(order.as_slice(), ["B", "A"], "B should complete before A");

    let _ = client.shutdown().await;
}
