//! Method routing for the MCP server.
//!
//! The [`Dispatcher`] turns one decoded [`Request`] into at most one
//! [`Response`]. It owns the handler [`Registry`] (read-only after
//! construction) and drives the [`ResourceCache`] around resource reads:
//!
//! 1. `resources/read` consults the cache before invoking the handler, and
//!    stores only successful, non-empty results.
//! 2. A successful call to a tool registered as [`ToolEffect::MutatesState`]
//!    invalidates every state-dependent cache key afterwards.
//!
//! Notifications never produce a response. Error responses always carry the
//! originating request ID.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::mcp::cache::ResourceCache;
use crate::mcp::progress::{CallScope, ProgressSink};
use crate::mcp::protocol::{
    methods, parse_message, Request, Response, RpcError, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::registry::{Registry, ToolEffect};
use crate::mcp::types::{
    CallToolParams, GetPromptParams, Implementation, InitializeParams, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListToolsResult, PromptsCapability,
    ReadResourceParams, RequestMeta, ResourcesCapability, ServerCapabilities, ToolsCapability,
};

/// Default guidance returned from `initialize`.
pub const DEFAULT_INSTRUCTIONS: &str = "This server manages software releases. \
Read release://state before acting. Plan a release with release_plan, attach notes with \
release_set_notes, then release_approve and release_publish. Resources under release:// \
are cached briefly and refreshed automatically after every state change.";

/// Routes MCP methods to registered handlers.
pub struct Dispatcher {
    registry: Registry,
    cache: Arc<ResourceCache>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
    server_info: Implementation,
    instructions: String,
}

impl Dispatcher {
    /// Creates a dispatcher without a progress sink.
    #[must_use]
    pub fn new(registry: Registry, cache: Arc<ResourceCache>) -> Self {
        Self {
            registry,
            cache,
            progress_sink: None,
            server_info: Implementation::this_crate(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    /// Attaches a sink for progress notifications.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// Replaces the instruction text returned from `initialize`.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Replaces the server name and version returned from `initialize`.
    #[must_use]
    pub fn with_server_info(mut self, server_info: Implementation) -> Self {
        self.server_info = server_info;
        self
    }

    /// Returns the resource cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Returns the handler registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the capabilities this server advertises.
    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: self.registry.has_tools().then(ToolsCapability::default),
            resources: self.registry.has_resources().then(ResourcesCapability::default),
            prompts: self.registry.has_prompts().then(PromptsCapability::default),
        }
    }

    /// Decodes one frame and dispatches it.
    ///
    /// Malformed frames yield an invalid-params response.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        match parse_message(line) {
            Ok(request) => self.handle(request).await,
            Err(response) => {
                tracing::warn!(id = ?response.id, "Rejected malformed message");
                Some(response)
            }
        }
    }

    /// Dispatches one request. Returns `None` for notifications.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        tracing::debug!(method = %request.method, id = %id, "Handling request");

        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.initialize(request.params),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.list_tools(),
            methods::TOOLS_CALL => self.call_tool(request.params).await,
            methods::RESOURCES_LIST => self.list_resources(),
            methods::RESOURCES_READ => self.read_resource(request.params).await,
            methods::PROMPTS_LIST => self.list_prompts(),
            methods::PROMPTS_GET => self.get_prompt(request.params).await,
            other => Err(RpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => {
                tracing::debug!(id = %id, code = error.code, message = %error.message, "Request failed");
                Response::failure(Some(id), error)
            }
        })
    }

    /// Handles an incoming notification.
    fn handle_notification(&self, notification: &Request) {
        match notification.method.as_str() {
            methods::INITIALIZED => tracing::info!("Client initialised"),
            methods::CANCELLED => {
                tracing::debug!(params = ?notification.params, "Client cancelled a request");
            }
            other => tracing::debug!(method = %other, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn initialize(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: InitializeParams = parse_params(params, methods::INITIALIZE)?;

        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version
        } else {
            tracing::warn!(
                requested = %params.protocol_version,
                offered = LATEST_PROTOCOL_VERSION,
                "Client requested an unsupported protocol version"
            );
            LATEST_PROTOCOL_VERSION.to_string()
        };

        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, version = %client.version, protocol = %protocol_version, "Client connected");
        }

        to_result(&InitializeResult {
            protocol_version,
            capabilities: self.capabilities(),
            server_info: self.server_info.clone(),
            instructions: Some(self.instructions.clone()),
        })
    }

    /// Handles the tools/list request.
    fn list_tools(&self) -> Result<Value, RpcError> {
        to_result(&ListToolsResult {
            tools: self.registry.tool_definitions().cloned().collect(),
        })
    }

    /// Handles the tools/call request.
    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: CallToolParams = parse_params(params, methods::TOOLS_CALL)?;
        let tool = self
            .registry
            .find_tool(&params.name)
            .ok_or_else(|| RpcError::method_not_found(&params.name))?;

        let scope = self.scope_for(params.meta.as_ref());
        let result = (tool.handler)(scope, params.arguments)
            .await
            .map_err(|e| handler_failure(&params.name, e))?;

        if tool.effect == ToolEffect::MutatesState && !result.is_error {
            let removed = self.cache.invalidate_state_dependent();
            tracing::debug!(tool = %params.name, removed, "Invalidated state-dependent resources");
        }

        to_result(&result)
    }

    /// Builds the call scope for a tool invocation.
    fn scope_for(&self, meta: Option<&RequestMeta>) -> CallScope {
        let token = meta.and_then(|m| m.progress_token.clone());
        match (token, &self.progress_sink) {
            (Some(token), Some(sink)) => CallScope::with_progress(token, Arc::clone(sink)),
            _ => CallScope::detached(),
        }
    }

    /// Handles the resources/list request.
    fn list_resources(&self) -> Result<Value, RpcError> {
        to_result(&ListResourcesResult {
            resources: self.registry.resource_definitions().cloned().collect(),
        })
    }

    /// Handles the resources/read request.
    async fn read_resource(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: ReadResourceParams = parse_params(params, methods::RESOURCES_READ)?;
        let resource = self
            .registry
            .find_resource(&params.uri)
            .ok_or_else(|| RpcError::method_not_found(&params.uri))?;

        if let Some(cached) = self.cache.get(&params.uri) {
            tracing::debug!(uri = %params.uri, "Resource cache hit");
            return Ok(cached);
        }

        let result = (resource.handler)(CallScope::detached(), params.uri.clone())
            .await
            .map_err(|e| handler_failure(&params.uri, e))?;
        let value = to_result(&result)?;

        if !result.contents.is_empty() {
            self.cache.set(&params.uri, value.clone());
        }

        Ok(value)
    }

    /// Handles the prompts/list request.
    fn list_prompts(&self) -> Result<Value, RpcError> {
        to_result(&ListPromptsResult {
            prompts: self.registry.prompt_definitions().cloned().collect(),
        })
    }

    /// Handles the prompts/get request.
    async fn get_prompt(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: GetPromptParams = parse_params(params, methods::PROMPTS_GET)?;
        let prompt = self
            .registry
            .find_prompt(&params.name)
            .ok_or_else(|| RpcError::method_not_found(&params.name))?;

        let result = (prompt.handler)(CallScope::detached(), params.arguments)
            .await
            .map_err(|e| handler_failure(&params.name, e))?;

        to_result(&result)
    }
}

/// Decodes method parameters.
fn parse_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params(format!("Missing {method} params")))?;
    serde_json::from_value(params)
        .map_err(|e| RpcError::invalid_params(format!("Invalid {method} params: {e}")))
}

/// Encodes a handler result.
fn to_result<T: Serialize>(result: &T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialise result");
        RpcError::internal("failed to serialise result")
    })
}

/// Converts a handler error into an RPC error.
fn handler_failure(target: &str, error: HandlerError) -> RpcError {
    match error {
        HandlerError::InvalidArguments(message) => RpcError::invalid_params(message),
        HandlerError::Failed(message) => {
            tracing::error!(target_name = %target, error = %message, "Handler failed");
            RpcError::internal(message)
        }
    }
}
