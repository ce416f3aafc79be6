//! Integration tests for the broker over TCP

use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use queuebroker::{Broker, BrokerError, BrokerServer, ClientOptions, MemoryBroker, Popped, RemoteBroker, ServerOptions};
use tokio::net::TcpListener;

async fn start() -> (BrokerServer, RemoteBroker) {
    let server = BrokerServer::bind("127.0.0.1:0", MemoryBroker::shared(), ServerOptions::default())
        .await
        .expect("Failed to bind broker");
    let client = RemoteBroker::new(server.local_addr().to_string());
    (server, client)
}

#[tokio::test]
async fn test_remote_push_then_pop() {
    let (_server, client) = start().await;

    client.push("jobs", b"first".to_vec()).await.unwrap();
    client.push("jobs", b"second".to_vec()).await.unwrap();
    assert_eq!(client.len("jobs").await.unwrap(), 2);

    assert_eq!(client.blocking_pop("jobs", None).await.unwrap(), Popped::Item(b"first".to_vec()));
    assert_eq!(client.blocking_pop("jobs", None).await.unwrap(), Popped::Item(b"second".to_vec()));
}

#[tokio::test]
async fn test_remote_pop_waits_for_push() {
    let (_server, client) = start().await;

    let popper = {
        let client = client.clone();
        tokio::spawn(async move { client.blocking_pop("jobs", None).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!popper.is_finished());

    client.push("jobs", b"wake".to_vec()).await.unwrap();
    let popped = tokio::time::timeout(Duration::from_secs(2), popper)
        .await
        .expect("Pop should complete after push")
        .unwrap()
        .unwrap();
    assert_eq!(popped, Popped::Item(b"wake".to_vec()));
}

#[tokio::test]
async fn test_remote_pop_timeout_not_early() {
    let (_server, client) = start().await;
    let limit = Duration::from_millis(80);

    let started = Instant::now();
    let popped = client.blocking_pop("nothing", Some(limit)).await.unwrap();

    assert_eq!(popped, Popped::Timeout);
    assert!(started.elapsed() >= limit);
}

#[tokio::test]
async fn test_remote_delete() {
    let (server, client) = start().await;

    client.push("response:1", vec![1]).await.unwrap();
    assert!(client.delete("response:1").await.unwrap());
    assert!(!client.delete("response:1").await.unwrap());
    assert_eq!(server.broker().queue_count(), 0);
}

#[tokio::test]
async fn test_cancelled_remote_pop_does_not_swallow_items() {
    let (server, client) = start().await;

    let waited = tokio::time::timeout(Duration::from_millis(50), client.blocking_pop("jobs", None)).await;
    assert!(waited.is_err());

    // Give the server a moment to notice the hang-up
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.push("jobs", b"survivor".to_vec()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(server.broker().len("jobs").await.unwrap(), 1);
}

#[tokio::test]
async fn test_ping_fails_after_shutdown() {
    let (mut server, client) = start().await;
    let client = client.with_options(ClientOptions {
        connect_timeout: Duration::from_millis(500),
        ..ClientOptions::default()
    });

    assert!(client.ping().await.unwrap());

    server.shutdown().await;
    let err = client.ping().await.unwrap_err();
    assert!(err.is_connection(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_waiting_pop_sees_connection_error_on_shutdown() {
    let (mut server, client) = start().await;

    let popper = {
        let client = client.clone();
        tokio::spawn(async move { client.blocking_pop("jobs", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(2), popper)
        .await
        .expect("Pop should fail once the broker is gone")
        .unwrap();
    assert!(result.unwrap_err().is_connection());
}

#[tokio::test]
async fn test_remote_pop_with_unrepresentable_timeout() {
    let (_server, client) = start().await;

    client.push("jobs", b"ready".to_vec()).await.unwrap();
    let popped = client.blocking_pop("jobs", Some(Duration::MAX)).await.unwrap();
    assert_eq!(popped, Popped::Item(b"ready".to_vec()));
}

#[tokio::test]
async fn test_heartbeats_keep_long_pop_alive() {
    let options = ServerOptions {
        heartbeat_interval: Duration::from_millis(20),
        ..ServerOptions::default()
    };
    let server = BrokerServer::bind("127.0.0.1:0", MemoryBroker::shared(), options)
        .await
        .unwrap();
    let client = RemoteBroker::new(server.local_addr().to_string()).with_options(ClientOptions {
        idle_timeout: Duration::from_millis(100),
        ..ClientOptions::default()
    });

    let popper = {
        let client = client.clone();
        tokio::spawn(async move { client.blocking_pop("jobs", None).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!popper.is_finished());

    server.broker().push("jobs", b"slow".to_vec()).await.unwrap();
    let popped = tokio::time::timeout(Duration::from_secs(2), popper)
        .await
        .expect("Pop should complete after push")
        .unwrap()
        .unwrap();
    assert_eq!(popped, Popped::Item(b"slow".to_vec()));
}

#[tokio::test]
async fn test_silent_broker_fails_unbounded_pop() {
    // Accepts connections and reads commands but never answers, like a host that vanished
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = RemoteBroker::new(addr.to_string()).with_options(ClientOptions {
        idle_timeout: Duration::from_millis(100),
        ..ClientOptions::default()
    });

    let result = tokio::time::timeout(Duration::from_secs(2), client.blocking_pop("jobs", None))
        .await
        .expect("Pop should give up on a silent broker");
    let err = result.unwrap_err();
    assert!(matches!(err, BrokerError::Unresponsive { .. }));
    assert!(err.is_connection());
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("qb")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("purge"));
}

#[test]
fn test_cli_ping_unreachable_fails() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    Command::cargo_bin("qb")
        .unwrap()
        .args(["--port", &port.to_string(), "ping"])
        .assert()
        .failure();
}
