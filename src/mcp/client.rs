//! MCP client: envelope construction and response correlation.
//!
//! [`Client`] assigns call identifiers from a monotonically increasing
//! counter, converts error responses into [`ClientError::Rpc`], and decodes
//! successful results into the caller's type. Session operations require a
//! completed [`Client::initialize`] handshake.
//!
//! ```rust,no_run
//! use release_mcp::mcp::client::Client;
//! use release_mcp::mcp::transport::StreamTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = StreamTransport::spawn("release-mcp", &[])?;
//! let mut client = Client::new(transport);
//! client.initialize().await?;
//!
//! let tools = client.list_tools().await?;
//! for tool in &tools.tools {
//!     println!("{}", tool.name);
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ClientError;
use crate::mcp::protocol::{methods, Request, RequestId, LATEST_PROTOCOL_VERSION};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    CallToolParams, CallToolResult, ClientCapabilities, GetPromptParams, GetPromptResult,
    Implementation, InitializeParams, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ProgressToken, ReadResourceParams, ReadResourceResult, RequestMeta,
    ServerCapabilities,
};

/// Client name sent during initialisation.
pub const CLIENT_NAME: &str = "release-mcp-client";

/// A client bound to one transport.
pub struct Client<T> {
    transport: T,
    next_id: AtomicI64,
    closed: AtomicBool,
    client_info: Implementation,
    capabilities: ClientCapabilities,
    session: Option<InitializeResult>,
}

impl<T: Transport> Client<T> {
    /// Creates an uninitialised client.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
            client_info: Implementation::new(CLIENT_NAME, env!("CARGO_PKG_VERSION")),
            capabilities: ClientCapabilities::default(),
            session: None,
        }
    }

    /// Replaces the name and version announced during initialisation.
    #[must_use]
    pub fn with_client_info(mut self, client_info: Implementation) -> Self {
        self.client_info = client_info;
        self
    }

    /// Replaces the capabilities declared during initialisation.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Returns the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Performs the initialisation handshake.
    ///
    /// Sends `initialize`, then the `notifications/initialized` notification.
    /// The server's answer is recorded only once both have been delivered.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after [`close`](Self::close),
    /// [`ClientError::AlreadyInitialized`] on a second call, or the error of
    /// the failed round trip.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, ClientError> {
        self.ensure_open()?;
        if self.session.is_some() {
            return Err(ClientError::AlreadyInitialized);
        }

        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            client_info: Some(self.client_info.clone()),
        };
        let result: InitializeResult = self
            .call(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await?;
        self.notify(methods::INITIALIZED, None).await?;

        tracing::info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Connected to server"
        );

        Ok(&*self.session.insert(result))
    }

    /// Returns `true` once the handshake has completed.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Capabilities declared by the server.
    #[must_use]
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.session.as_ref().map(|s| &s.capabilities)
    }

    /// Name and version declared by the server.
    #[must_use]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.session.as_ref().map(|s| &s.server_info)
    }

    /// Instruction text supplied by the server.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.instructions.as_deref())
    }

    /// Protocol version chosen by the server.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.protocol_version.as_str())
    }

    /// Calls `method` and decodes the result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] if the server answered with an error,
    /// [`ClientError::MismatchedId`] if the answer belongs to another call,
    /// or a transport or decode error.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R, ClientError> {
        self.ensure_open()?;

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Request::call(id.clone(), method, params);

        tracing::debug!(method = %method, id = %id, "Sending request");
        let response = self
            .transport
            .send(&request)
            .await?
            .ok_or(ClientError::MissingResult)?;

        // Only error responses may omit the id: the server could not read it.
        let id_matches = match &response.id {
            Some(actual) => *actual == id,
            None => response.error.is_some(),
        };
        if !id_matches {
            return Err(ClientError::MismatchedId {
                expected: id,
                actual: response.id,
            });
        }

        if let Some(error) = response.error {
            return Err(ClientError::Rpc(error));
        }

        let result = response.result.ok_or(ClientError::MissingResult)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sends a notification. Any reply is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the transport fails.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        self.ensure_open()?;
        tracing::debug!(method = %method, "Sending notification");
        self.transport
            .send(&Request::notification(method, params))
            .await?;
        Ok(())
    }

    /// Checks that the server is responsive.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.ensure_initialized()?;
        self.call::<Value>(methods::PING, None).await?;
        Ok(())
    }

    /// Lists the server's tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    pub async fn list_tools(&self) -> Result<ListToolsResult, ClientError> {
        self.ensure_initialized()?;
        self.call(methods::TOOLS_LIST, None).await
    }

    /// Calls a tool.
    ///
    /// A tool-level failure is returned as a result with `is_error` set.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails or the server rejects the call.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ClientError> {
        self.call_tool_inner(name, arguments, None).await
    }

    /// Calls a tool and asks the server to report progress under `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails or the server rejects the call.
    pub async fn call_tool_with_progress(
        &self,
        name: &str,
        arguments: Value,
        token: ProgressToken,
    ) -> Result<CallToolResult, ClientError> {
        let meta = RequestMeta {
            progress_token: Some(token),
        };
        self.call_tool_inner(name, arguments, Some(meta)).await
    }

    /// Calls a tool and decodes its first content item as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Tool`] if the tool reported failure or returned
    /// no text content, [`ClientError::Payload`] if the content is not valid JSON
    /// for `R`, or the error of the round trip.
    pub async fn call_tool_json<R: DeserializeOwned>(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<R, ClientError> {
        let result = self.call_tool(name, arguments).await?;

        if result.is_error {
            return Err(ClientError::Tool {
                tool: name.to_string(),
                message: result
                    .first_text()
                    .unwrap_or("tool reported an error")
                    .to_string(),
            });
        }

        let text = result.first_text().ok_or_else(|| ClientError::Tool {
            tool: name.to_string(),
            message: "tool returned no text content".to_string(),
        })?;

        Ok(serde_json::from_str(text)?)
    }

    /// Lists the server's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    pub async fn list_resources(&self) -> Result<ListResourcesResult, ClientError> {
        self.ensure_initialized()?;
        self.call(methods::RESOURCES_LIST, None).await
    }

    /// Reads a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails or the resource is unknown.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        self.ensure_initialized()?;
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.call(methods::RESOURCES_READ, Some(serde_json::to_value(params)?))
            .await
    }

    /// Lists the server's prompts.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    pub async fn list_prompts(&self) -> Result<ListPromptsResult, ClientError> {
        self.ensure_initialized()?;
        self.call(methods::PROMPTS_LIST, None).await
    }

    /// Renders a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails or the prompt is unknown.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, ClientError> {
        self.ensure_initialized()?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.call(methods::PROMPTS_GET, Some(serde_json::to_value(params)?))
            .await
    }

    /// Closes the client and its transport. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport failed to close.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.transport.close().await?;
        Ok(())
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        arguments: Value,
        meta: Option<RequestMeta>,
    ) -> Result<CallToolResult, ClientError> {
        self.ensure_initialized()?;
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
            meta,
        };
        self.call(methods::TOOLS_CALL, Some(serde_json::to_value(params)?))
            .await
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), ClientError> {
        self.ensure_open()?;
        if self.session.is_none() {
            return Err(ClientError::NotInitialized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::TransportError;
    use crate::mcp::protocol::{ErrorCode, Response, RpcError};
    use crate::mcp::types::{Content, ToolsCapability};

    type Reply = Box<dyn Fn(&Request) -> Result<Option<Response>, TransportError> + Send + Sync>;

    struct MockTransport {
        reply: Reply,
        sent: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        fn new<F>(reply: F) -> Self
        where
            F: Fn(&Request) -> Result<Option<Response>, TransportError> + Send + Sync + 'static,
        {
            Self {
                reply: Box::new(reply),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<Request> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            if request.is_notification() {
                return Ok(None);
            }
            (self.reply)(request)
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn init_result() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..ServerCapabilities::default()
            },
            server_info: Implementation::new("test-server", "9.9.9"),
            instructions: Some("read the state first".to_string()),
        }
    }

    /// A server that answers `initialize` and routes every other call to `rest`.
    fn server<F>(rest: F) -> MockTransport
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        MockTransport::new(move |request| {
            let id = request.id.clone().unwrap();
            if request.method == methods::INITIALIZE {
                return Ok(Some(Response::success(
                    id,
                    serde_json::to_value(init_result()).unwrap(),
                )));
            }
            Ok(Some(rest(request)))
        })
    }

    fn tool_reply(request: &Request, result: &CallToolResult) -> Response {
        Response::success(request.id.clone().unwrap(), serde_json::to_value(result).unwrap())
    }

    #[tokio::test]
    async fn handshake_records_server_declarations() {
        let mut client = Client::new(server(|r| Response::success(r.id.clone().unwrap(), json!({}))));
        client.initialize().await.unwrap();

        assert_eq!(client.server_capabilities(), Some(&init_result().capabilities));
        assert_eq!(client.server_info(), Some(&init_result().server_info));
        assert_eq!(client.instructions(), Some("read the state first"));
        assert_eq!(client.protocol_version(), Some(LATEST_PROTOCOL_VERSION));

        let sent = client.transport().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].method, methods::INITIALIZE);
        assert_eq!(sent[0].id, Some(RequestId::Number(1)));
        assert_eq!(sent[1].method, methods::INITIALIZED);
        assert!(sent[1].is_notification());

        let params: InitializeParams = serde_json::from_value(sent[0].params.clone().unwrap()).unwrap();
        assert_eq!(params.protocol_version, LATEST_PROTOCOL_VERSION);
        assert_eq!(params.client_info.unwrap().name, CLIENT_NAME);
    }

    #[tokio::test]
    async fn handshake_transport_failure_records_nothing() {
        let mut client = Client::new(MockTransport::new(|_| Err(TransportError::ConnectionClosed)));
        let err = client.initialize().await.unwrap_err();

        assert!(matches!(err, ClientError::Transport(TransportError::ConnectionClosed)));
        assert!(client.server_capabilities().is_none());
        assert!(client.server_info().is_none());
        assert!(!client.is_initialized());
    }

    #[tokio::test]
    async fn handshake_runs_once() {
        let mut client = Client::new(server(|r| Response::success(r.id.clone().unwrap(), json!({}))));
        client.initialize().await.unwrap();
        assert!(matches!(
            client.initialize().await.unwrap_err(),
            ClientError::AlreadyInitialized
        ));
    }

    #[tokio::test]
    async fn closed_client_fails_before_io() {
        let mut client = Client::new(server(|r| Response::success(r.id.clone().unwrap(), json!({}))));
        client.close().await.unwrap();
        client.close().await.unwrap();

        assert!(matches!(client.initialize().await.unwrap_err(), ClientError::Closed));
        assert!(matches!(
            client.notify("notifications/cancelled", None).await.unwrap_err(),
            ClientError::Closed
        ));
        assert!(client.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn session_calls_require_initialize() {
        let client = Client::new(server(|r| Response::success(r.id.clone().unwrap(), json!({}))));
        assert!(matches!(client.list_tools().await.unwrap_err(), ClientError::NotInitialized));
        assert!(matches!(client.ping().await.unwrap_err(), ClientError::NotInitialized));
        assert!(client.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn identifiers_increase_per_call() {
        let mut client = Client::new(server(|r| Response::success(r.id.clone().unwrap(), json!({}))));
        client.initialize().await.unwrap();
        client.ping().await.unwrap();
        client.ping().await.unwrap();

        let ids: Vec<Option<RequestId>> = client.transport().sent().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                Some(RequestId::Number(1)),
                None,
                Some(RequestId::Number(2)),
                Some(RequestId::Number(3)),
            ]
        );
    }

    #[tokio::test]
    async fn params_are_omitted_when_absent() {
        let mut client = Client::new(server(|r| Response::success(r.id.clone().unwrap(), json!({}))));
        client.initialize().await.unwrap();
        client.ping().await.unwrap();

        let ping = client.transport().sent().pop().unwrap();
        assert!(ping.params.is_none());
        let encoded = serde_json::to_value(&ping).unwrap();
        assert!(encoded.get("params").is_none());
    }

    #[tokio::test]
    async fn error_responses_become_rpc_errors() {
        let mut client = Client::new(server(|r| {
            Response::failure(r.id.clone(), RpcError::method_not_found("nope"))
        }));
        client.initialize().await.unwrap();

        match client.call_tool("nope", json!({})).await.unwrap_err() {
            ClientError::Rpc(error) => {
                assert!(error.is(ErrorCode::MethodNotFound));
                assert_eq!(error.data, Some(json!("nope")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_response_id_is_rejected() {
        let mut client = Client::new(server(|_| Response::success(RequestId::Number(99), json!({}))));
        client.initialize().await.unwrap();

        match client.ping().await.unwrap_err() {
            ClientError::MismatchedId { expected, actual } => {
                assert_eq!(expected, RequestId::Number(2));
                assert_eq!(actual, Some(RequestId::Number(99)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn anonymous_success_is_rejected() {
        let mut client = Client::new(server(|_| {
            let mut response = Response::success(RequestId::Number(0), json!({}));
            response.id = None;
            response
        }));
        client.initialize().await.unwrap();

        match client.ping().await.unwrap_err() {
            ClientError::MismatchedId { expected, actual } => {
                assert_eq!(expected, RequestId::Number(2));
                assert_eq!(actual, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn anonymous_error_is_still_reported() {
        let mut client = Client::new(server(|_| Response::failure(None, RpcError::malformed("eof"))));
        client.initialize().await.unwrap();

        match client.ping().await.unwrap_err() {
            ClientError::Rpc(error) => assert!(error.is(ErrorCode::InvalidParams)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn typed_tool_results_are_decoded() {
        let mut client = Client::new(server(|r| {
            tool_reply(r, &CallToolResult::json(&json!({"version": "1.2.0", "state": "planned"})))
        }));
        client.initialize().await.unwrap();

        let value: Value = client.call_tool_json("release_status", json!({})).await.unwrap();
        assert_eq!(value["version"], json!("1.2.0"));
    }

    #[tokio::test]
    async fn typed_tool_failure_carries_server_message() {
        let mut client = Client::new(server(|r| tool_reply(r, &CallToolResult::error("not approved"))));
        client.initialize().await.unwrap();

        match client.call_tool_json::<Value>("release_publish", json!({})).await.unwrap_err() {
            ClientError::Tool { tool, message } => {
                assert_eq!(tool, "release_publish");
                assert_eq!(message, "not approved");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn typed_tool_without_content_fails() {
        let mut client = Client::new(server(|r| {
            tool_reply(
                r,
                &CallToolResult {
                    content: Vec::new(),
                    is_error: false,
                },
            )
        }));
        client.initialize().await.unwrap();

        let err = client.call_tool_json::<Value>("release_status", json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Tool { .. }));
    }

    #[tokio::test]
    async fn typed_tool_with_non_json_text_is_payload_error() {
        let mut client = Client::new(server(|r| {
            tool_reply(
                r,
                &CallToolResult {
                    content: vec![Content::Text {
                        text: "plain words".to_string(),
                    }],
                    is_error: false,
                },
            )
        }));
        client.initialize().await.unwrap();

        let err = client.call_tool_json::<Value>("release_status", json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Payload(_)));
    }

    #[tokio::test]
    async fn progress_token_travels_in_meta() {
        let mut client = Client::new(server(|r| tool_reply(r, &CallToolResult::text("done"))));
        client.initialize().await.unwrap();
        client
            .call_tool_with_progress("release_publish", json!({}), ProgressToken::Number(7))
            .await
            .unwrap();

        let call = client.transport().sent().pop().unwrap();
        assert_eq!(call.params.unwrap()["_meta"], json!({"progressToken": 7}));
    }
}
