//! HTTP transport tests against a server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};

use release_mcp::config::RepositoryConfig;
use release_mcp::error::{ClientError, TransportError};
use release_mcp::mcp::cache::{ResourceCache, STATE_URI};
use release_mcp::mcp::http::{spawn_http, MCP_PATH};
use release_mcp::mcp::protocol::{methods, ErrorCode};
use release_mcp::mcp::{Client, Dispatcher, HttpTransport};
use release_mcp::release::{self, InMemoryStore, ReleaseService};

async fn start_server() -> SocketAddr {
    let service = ReleaseService::new(
        Arc::new(InMemoryStore::new()),
        RepositoryConfig {
            name: "widgets".to_string(),
            initial_version: "0.1.0".to_string(),
        },
    );
    let dispatcher = Dispatcher::new(release::registry(Arc::new(service)), Arc::new(ResourceCache::new()));
    spawn_http(Arc::new(dispatcher), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap()
}

fn endpoint(addr: SocketAddr) -> String {
    format!("http://{addr}{MCP_PATH}")
}

#[tokio::test]
async fn client_round_trips_over_http() {
    let addr = start_server().await;
    let mut client = Client::new(HttpTransport::new(endpoint(addr)).unwrap());
    client.initialize().await.unwrap();

    let planned: Value = client
        .call_tool_json("release_plan", json!({"version": "1.0.0"}))
        .await
        .unwrap();
    assert_eq!(planned["state"], json!("planned"));

    let state = client.read_resource(STATE_URI).await.unwrap();
    let state: Value = serde_json::from_str(state.first_text().unwrap()).unwrap();
    assert_eq!(state["version"], json!("1.0.0"));

    let err = client.call_tool("release_frobnicate", json!({})).await.unwrap_err();
    match err {
        ClientError::Rpc(e) => assert_eq!(e.code, ErrorCode::MethodNotFound.code()),
        other => panic!("expected an RPC error, got {other:?}"),
    }

    client.close().await.unwrap();
    assert!(matches!(client.ping().await, Err(ClientError::Closed)));
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let addr = start_server().await;

    let response = reqwest::Client::new()
        .post(endpoint(addr))
        .header("content-type", "application/json")
        .body(json!({"jsonrpc": "2.0", "method": methods::INITIALIZED}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    assert!(response.text().await.unwrap().is_empty());

    let client = Client::new(HttpTransport::new(endpoint(addr)).unwrap());
    client.notify(methods::INITIALIZED, None).await.unwrap();
}

#[tokio::test]
async fn malformed_body_is_answered_with_invalid_params() {
    let addr = start_server().await;

    let response = reqwest::Client::new()
        .post(endpoint(addr))
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], Value::Null);
    assert_eq!(body["error"]["code"], json!(ErrorCode::InvalidParams.code()));
}

#[tokio::test]
async fn non_success_status_is_a_transport_error() {
    let addr = start_server().await;
    let mut client = Client::new(HttpTransport::new(format!("http://{addr}/elsewhere")).unwrap());

    match client.initialize().await {
        Err(ClientError::Transport(TransportError::Status { status })) => assert_eq!(status, 404),
        other => panic!("expected a status error, got {other:?}"),
    }
    assert!(!client.is_initialized());
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let addr = start_server().await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}
