#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Timeouts, refused connections and cancellation.

use http::Method;
use httpmock::prelude::*;
use std::time::Duration;
use stub_http_client::{ClientConfig, ErrorKind, HttpError, TestClient, run_blocking};
use tokio::net::TcpListener;

/// Accepts connections and never answers; returns the base URL.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn test_silent_server_hits_read_timeout() {
    let url = silent_server().await;
    let client = TestClient::with_config(ClientConfig {
        url,
        read_timeout: Duration::from_millis(150),
        ..ClientConfig::for_testing()
    })
    .unwrap();

    let err = client
        .call_without_response(Method::GET, "/stall", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Timeout(_)), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Request);
}

#[tokio::test]
async fn test_refused_connection_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = TestClient::with_config(ClientConfig {
        url: format!("http://{addr}"),
        ..ClientConfig::for_testing()
    })
    .unwrap();

    let err = client
        .call_with_response::<String>(Method::GET, "/", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Transport(_)), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Request);
}

#[tokio::test]
async fn test_connect_timeout_fails_the_call() {
    // Non-routable: the SYN goes unanswered.
    let client = TestClient::with_config(ClientConfig {
        url: "http://10.255.255.1:81".to_owned(),
        connection_timeout: Duration::from_millis(100),
        ..ClientConfig::for_testing()
    })
    .unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        client.call_without_response(Method::GET, "/", None, None),
    )
    .await
    .expect("connect timeout should resolve the call");

    let err = outcome.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Request, "got {err:?}");
}

#[tokio::test]
async fn test_dropped_call_leaves_client_usable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200).delay(Duration::from_secs(2));
    });
    let fast = server.mock(|when, then| {
        when.method(GET).path("/fast");
        then.status(200).body("done");
    });

    let client = TestClient::with_config(ClientConfig {
        url: server.base_url(),
        ..ClientConfig::for_testing()
    })
    .unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        client.call_without_response(Method::GET, "/slow", None, None),
    )
    .await;
    assert!(abandoned.is_err(), "slow call should have been cancelled");

    let body: Option<String> = client
        .call_with_response(Method::GET, "/fast", None, None)
        .await
        .unwrap();
    assert_eq!(body.as_deref(), Some("done"));
    fast.assert();
}

#[test]
fn test_run_blocking_drives_a_call() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/hello");
        then.status(200).body("ok");
    });
    let url = server.base_url();

    let body = run_blocking(async move {
        let client = TestClient::with_config(ClientConfig {
            url,
            ..ClientConfig::for_testing()
        })?;
        client
            .call_with_response::<String>(Method::GET, "/hello", None, None)
            .await
    })
    .unwrap()
    .unwrap();

    assert_eq!(body.as_deref(), Some("ok"));
    mock.assert();
}

#[test]
fn test_default_client_targets_local_stub() {
    let client = run_blocking(async { TestClient::new() }).unwrap().unwrap();

    assert_eq!(client.client().base_url().as_str(), "http://localhost:10001/");
    assert_eq!(client.client().pool_name(), "test-provider");
    assert_eq!(client.config().max_retry, 0);
}
