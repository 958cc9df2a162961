//! Control API Integration Tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use botherd::{
    config::Config,
    control::{types::ApiAuthConfig, ControlServer},
    metrics::Metrics,
    Pool,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn create_test_server() -> (
    Router,
    mpsc::UnboundedReceiver<botherd::allocator::SpawnRequest>,
) {
    let config = Arc::new(Config::default());
    let metrics = Arc::new(Metrics::new());
    let (pool, spawn_rx) = Pool::new(config, Arc::clone(&metrics));

    // Authentication disabled for testing
    let auth_config = ApiAuthConfig {
        enabled: false,
        api_key: None,
        basic_auth: None,
    };

    let server = ControlServer::new(
        "127.0.0.1:8430".parse().unwrap(),
        pool,
        metrics,
        auth_config,
    );
    (server.create_test_router(), spawn_rx)
}

async fn response_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_control_api_health_endpoint() {
    let (app, _spawn_rx) = create_test_server();

    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_control_api_status_endpoint() {
    let (app, _spawn_rx) = create_test_server();

    let request = Request::builder()
        .uri("/api/v1/status")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["servers"], json!(0));
}

#[tokio::test]
async fn test_control_api_stats_endpoint() {
    let (app, _spawn_rx) = create_test_server();

    let request = Request::builder()
        .uri("/api/v1/stats")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_control_api_add_channel_flow() {
    let (app, mut spawn_rx) = create_test_server();

    // Add a channel on a server the pool has never seen
    let request_data = json!({
        "host": "irc.example.net",
        "port": 6667,
        "channel": "#commits"
    });

    let request = Request::builder()
        .uri("/api/v1/channels")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(request_data.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["already_active"], json!(false));

    // The pool asked for one new connection
    let spawn = spawn_rx.try_recv().unwrap();
    assert_eq!(spawn.server.host, "irc.example.net");

    // The server now shows up in the server list
    let request = Request::builder()
        .uri("/api/v1/servers")
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body(response).await;
    assert_eq!(body["data"][0]["host"], json!("irc.example.net"));

    // No connection is up yet, so no channel is active
    let request = Request::builder()
        .uri("/api/v1/servers/irc.example.net/6667/channels")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let body = response_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_control_api_remove_channel_releases_server() {
    let (app, _spawn_rx) = create_test_server();

    let add = json!({"host": "irc.example.net", "port": 6667, "channel": "#commits"});
    let request = Request::builder()
        .uri("/api/v1/channels")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(add.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap();

    // Remove the only channel again
    let remove = json!({"host": "irc.example.net", "port": 6667, "channel": "#commits"});
    let request = Request::builder()
        .uri("/api/v1/channels/remove")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(remove.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The server entry is gone
    let request = Request::builder()
        .uri("/api/v1/servers")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let body = response_body(response).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_control_api_send_to_unmanaged_channel() {
    let (app, _spawn_rx) = create_test_server();

    let message = json!({
        "host": "irc.example.net",
        "port": 6667,
        "channel": "#nowhere",
        "text": "hello"
    });

    let request = Request::builder()
        .uri("/api/v1/messages")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(message.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("no active connection"));
}

#[tokio::test]
async fn test_control_api_authentication() {
    let config = Arc::new(Config::default());
    let metrics = Arc::new(Metrics::new());
    let (pool, _spawn_rx) = Pool::new(config, Arc::clone(&metrics));

    // Authentication enabled for testing
    let auth_config = ApiAuthConfig {
        enabled: true,
        api_key: Some("test-api-key".to_string()),
        basic_auth: None,
    };

    let server = ControlServer::new(
        "127.0.0.1:8430".parse().unwrap(),
        pool,
        metrics,
        auth_config,
    );
    let app = server.create_test_router();

    // Test protected endpoint without authentication - should fail
    let request = Request::builder()
        .uri("/api/v1/status")
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Test protected endpoint with correct API key - should succeed
    let request = Request::builder()
        .uri("/api/v1/status")
        .header("x-api-key", "test-api-key")
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Test protected endpoint with incorrect API key - should fail
    let request = Request::builder()
        .uri("/api/v1/status")
        .header("x-api-key", "wrong-key")
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Health stays public even with authentication enabled
    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
