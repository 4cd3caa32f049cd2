//! End-to-end tests: a client driving the release server in-process and over
//! a line-framed stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::duplex;

use release_mcp::config::RepositoryConfig;
use release_mcp::error::ClientError;
use release_mcp::mcp::cache::{ResourceCache, CHANGELOG_URI, CONFIG_URI, RISK_URI, STATE_URI};
use release_mcp::mcp::protocol::{methods, ErrorCode, Request, LATEST_PROTOCOL_VERSION, SERVER_NAME};
use release_mcp::mcp::types::ProgressToken;
use release_mcp::mcp::{Client, Dispatcher, LoopbackTransport, McpServer, StdioTransport, StreamTransport};
use release_mcp::release::{self, InMemoryStore, ReleaseService};

fn dispatcher() -> Dispatcher {
    let service = ReleaseService::new(
        Arc::new(InMemoryStore::new()),
        RepositoryConfig {
            name: "widgets".to_string(),
            initial_version: "0.1.0".to_string(),
        },
    );
    Dispatcher::new(release::registry(Arc::new(service)), Arc::new(ResourceCache::new()))
}

async fn loopback_client() -> (Arc<Dispatcher>, Client<LoopbackTransport>) {
    let dispatcher = Arc::new(dispatcher());
    let mut client = Client::new(LoopbackTransport::new(Arc::clone(&dispatcher)));
    client.initialize().await.unwrap();
    (dispatcher, client)
}

fn plan_args() -> Value {
    json!({
        "version": "1.0.0",
        "commits": [
            {"sha": "a1b2c3d4e5f6", "message": "feat(api): add search", "author": "ada"},
            {"sha": "b2c3d4e5f6a7", "message": "fix: handle empty input"}
        ]
    })
}

fn resource_json(text: Option<&str>) -> Value {
    serde_json::from_str(text.unwrap()).unwrap()
}

fn rpc_code(err: &ClientError) -> i32 {
    match err {
        ClientError::Rpc(e) => e.code,
        other => panic!("expected an RPC error, got {other:?}"),
    }
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn handshake_records_session() {
    let dispatcher = Arc::new(dispatcher());
    let mut client = Client::new(LoopbackTransport::new(dispatcher));
    assert!(!client.is_initialized());

    let session = client.initialize().await.unwrap();
    assert_eq!(session.protocol_version, LATEST_PROTOCOL_VERSION);
    assert_eq!(session.server_info.name, SERVER_NAME);

    assert!(client.is_initialized());
    let capabilities = client.server_capabilities().unwrap();
    assert!(capabilities.tools.is_some());
    assert!(capabilities.resources.is_some());
    assert!(capabilities.prompts.is_some());
    assert!(client.instructions().is_some());

    assert!(matches!(
        client.initialize().await,
        Err(ClientError::AlreadyInitialized)
    ));
}

#[tokio::test]
async fn session_calls_require_initialize() {
    let client = Client::new(LoopbackTransport::new(Arc::new(dispatcher())));
    assert!(matches!(client.list_tools().await, Err(ClientError::NotInitialized)));
    assert!(matches!(
        client.read_resource(STATE_URI).await,
        Err(ClientError::NotInitialized)
    ));
}

#[tokio::test]
async fn listings_follow_registration_order() {
    let (_, client) = loopback_client().await;

    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["release_status", "release_plan", "release_set_notes", "release_approve", "release_publish"]
    );
    let status = &tools.tools[0];
    assert_eq!(status.annotations.as_ref().map(|a| a.read_only_hint), Some(true));

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.resources.len(), 5);
    assert_eq!(resources.resources[0].uri, STATE_URI);

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.prompts.len(), 2);

    client.ping().await.unwrap();
}

// =============================================================================
// Release lifecycle
// =============================================================================

#[tokio::test]
async fn full_release_lifecycle() {
    let (_, client) = loopback_client().await;

    let status: Value = client.call_tool_json("release_status", json!({})).await.unwrap();
    assert_eq!(status["state"], json!("none"));

    let planned: Value = client.call_tool_json("release_plan", plan_args()).await.unwrap();
    assert_eq!(planned["state"], json!("planned"));
    assert_eq!(planned["version"], json!("1.0.0"));

    client
        .call_tool_json::<Value>("release_set_notes", json!({"notes": "Search lands."}))
        .await
        .unwrap();
    let approved: Value = client
        .call_tool_json("release_approve", json!({"approver": "grace"}))
        .await
        .unwrap();
    assert_eq!(approved["state"], json!("approved"));
    assert_eq!(approved["approver"], json!("grace"));

    let published: Value = client.call_tool_json("release_publish", json!({})).await.unwrap();
    assert_eq!(published["state"], json!("published"));
    assert!(published.get("publishedAt").is_some());

    let changelog = client.read_resource(CHANGELOG_URI).await.unwrap();
    let text = changelog.first_text().unwrap();
    assert!(text.starts_with("# widgets 1.0.0\n\nSearch lands.\n"));
    assert!(text.contains("- feat(api): add search (a1b2c3d)"));
}

#[tokio::test]
async fn rule_violations_are_tool_errors() {
    let (_, client) = loopback_client().await;
    client.call_tool("release_plan", plan_args()).await.unwrap();

    let result = client
        .call_tool("release_approve", json!({"approver": "grace"}))
        .await
        .unwrap();
    assert!(result.is_error);

    let err = client
        .call_tool_json::<Value>("release_publish", json!({}))
        .await
        .unwrap_err();
    match err {
        ClientError::Tool { tool, message } => {
            assert_eq!(tool, "release_publish");
            assert!(message.contains("cannot publish"), "{message}");
        }
        other => panic!("expected a tool error, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_targets_are_method_not_found() {
    let (_, client) = loopback_client().await;
    let not_found = ErrorCode::MethodNotFound.code();

    let err = client.call_tool("release_frobnicate", json!({})).await.unwrap_err();
    assert_eq!(rpc_code(&err), not_found);
    if let ClientError::Rpc(e) = &err {
        assert_eq!(e.data, Some(json!("release_frobnicate")));
    }

    let err = client.read_resource("release://nope").await.unwrap_err();
    assert_eq!(rpc_code(&err), not_found);

    let err = client.get_prompt("nope", HashMap::new()).await.unwrap_err();
    assert_eq!(rpc_code(&err), not_found);

    let err = client.call::<Value>("releases/frobnicate", None).await.unwrap_err();
    assert_eq!(rpc_code(&err), not_found);
}

#[tokio::test]
async fn bad_arguments_are_invalid_params() {
    let (_, client) = loopback_client().await;

    let err = client
        .call_tool("release_plan", json!({"commits": []}))
        .await
        .unwrap_err();
    assert_eq!(rpc_code(&err), ErrorCode::InvalidParams.code());

    // Nothing to announce yet.
    let err = client
        .get_prompt("release_announcement", HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(rpc_code(&err), ErrorCode::InvalidParams.code());
}

#[tokio::test]
async fn prompts_render_current_release() {
    let (_, client) = loopback_client().await;
    client.call_tool("release_plan", plan_args()).await.unwrap();

    let args = HashMap::from([("audience".to_string(), "operators".to_string())]);
    let prompt = client.get_prompt("release_announcement", args).await.unwrap();
    assert!(prompt.messages[0]
        .content
        .as_text()
        .unwrap()
        .contains("for operators about widgets 1.0.0"));

    let review = client.get_prompt("risk_review", HashMap::new()).await.unwrap();
    assert!(review.messages[0].content.as_text().unwrap().contains("Risk level: Low"));
}

// =============================================================================
// Resource cache
// =============================================================================

#[tokio::test]
async fn mutations_refresh_state_dependent_resources() {
    let (dispatcher, client) = loopback_client().await;

    let before = client.read_resource(STATE_URI).await.unwrap();
    assert_eq!(resource_json(before.first_text())["state"], json!("none"));
    client.read_resource(CONFIG_URI).await.unwrap();
    client.read_resource(RISK_URI).await.unwrap();
    assert!(dispatcher.cache().get(STATE_URI).is_some());

    client.call_tool("release_plan", plan_args()).await.unwrap();

    assert!(dispatcher.cache().get(STATE_URI).is_none());
    assert!(dispatcher.cache().get(RISK_URI).is_none());
    assert!(dispatcher.cache().get(CONFIG_URI).is_some());

    let after = client.read_resource(STATE_URI).await.unwrap();
    assert_eq!(resource_json(after.first_text())["state"], json!("planned"));
}

#[tokio::test]
async fn reads_and_failed_mutations_keep_the_cache() {
    let (dispatcher, client) = loopback_client().await;
    client.call_tool("release_plan", plan_args()).await.unwrap();
    client.read_resource(STATE_URI).await.unwrap();

    client.call_tool("release_status", json!({})).await.unwrap();
    assert!(dispatcher.cache().get(STATE_URI).is_some());

    let rejected = client
        .call_tool("release_approve", json!({"approver": "grace"}))
        .await
        .unwrap();
    assert!(rejected.is_error);
    assert!(dispatcher.cache().get(STATE_URI).is_some());
}

#[tokio::test]
async fn cached_reads_are_served_until_invalidated() {
    let (dispatcher, client) = loopback_client().await;
    client.call_tool("release_plan", plan_args()).await.unwrap();

    let first = client.read_resource(STATE_URI).await.unwrap();
    let second = client.read_resource(STATE_URI).await.unwrap();
    assert_eq!(first, second);

    dispatcher.cache().invalidate_all();
    let stats = dispatcher.cache().stats();
    assert_eq!(stats.total_entries, 0);
}

// =============================================================================
// Stream transport against the stdio server
// =============================================================================

#[tokio::test]
async fn stream_client_drives_server_with_progress() {
    let (client_writer, server_reader) = duplex(64 * 1024);
    let (server_writer, client_reader) = duplex(64 * 1024);

    let mut server = McpServer::from_parts(StdioTransport::from_parts(server_reader, server_writer), dispatcher());

    let received: Arc<Mutex<Vec<Request>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let transport = StreamTransport::new(client_reader, client_writer)
        .with_notification_handler(move |message| sink.lock().unwrap().push(message));

    let session = async move {
        let mut client = Client::new(transport);
        client.initialize().await.unwrap();

        client.call_tool("release_plan", plan_args()).await.unwrap();
        client
            .call_tool("release_set_notes", json!({"notes": "Search lands."}))
            .await
            .unwrap();
        client
            .call_tool("release_approve", json!({"approver": "grace"}))
            .await
            .unwrap();
        let published = client
            .call_tool_with_progress("release_publish", json!({}), ProgressToken::String("pub-1".to_string()))
            .await
            .unwrap();
        assert!(!published.is_error);

        let err = client.call_tool("release_frobnicate", json!({})).await.unwrap_err();
        assert_eq!(rpc_code(&err), ErrorCode::MethodNotFound.code());

        client.close().await.unwrap();
    };

    let (served, ()) = tokio::join!(server.serve(), session);
    served.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 4);
    assert!(received.iter().all(|m| m.method == methods::PROGRESS && m.is_notification()));
    let progress: Vec<u64> = received
        .iter()
        .map(|m| m.params.as_ref().unwrap()["progress"].as_u64().unwrap())
        .collect();
    assert_eq!(progress, vec![1, 2, 3, 4]);
    assert_eq!(received[0].params.as_ref().unwrap()["progressToken"], json!("pub-1"));
    assert_eq!(received[0].params.as_ref().unwrap()["total"], json!(4));
}

#[tokio::test]
async fn calls_without_token_get_no_progress() {
    let (client_writer, server_reader) = duplex(64 * 1024);
    let (server_writer, client_reader) = duplex(64 * 1024);

    let mut server = McpServer::from_parts(StdioTransport::from_parts(server_reader, server_writer), dispatcher());

    let received: Arc<Mutex<Vec<Request>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let transport = StreamTransport::new(client_reader, client_writer)
        .with_notification_handler(move |message| sink.lock().unwrap().push(message));

    let session = async move {
        let mut client = Client::new(transport);
        client.initialize().await.unwrap();
        client.call_tool("release_plan", plan_args()).await.unwrap();
        client
            .call_tool("release_set_notes", json!({"notes": "n"}))
            .await
            .unwrap();
        client
            .call_tool("release_approve", json!({"approver": "grace"}))
            .await
            .unwrap();
        client.call_tool("release_publish", json!({})).await.unwrap();
        client.close().await.unwrap();
    };

    let (served, ()) = tokio::join!(server.serve(), session);
    served.unwrap();
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn closed_client_rejects_calls() {
    let (_, client) = loopback_client().await;
    client.close().await.unwrap();
    client.close().await.unwrap();

    assert!(matches!(client.ping().await, Err(ClientError::Closed)));
}
