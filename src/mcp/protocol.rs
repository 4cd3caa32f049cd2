//! JSON-RPC 2.0 envelope types for the MCP protocol.
//!
//! This module defines the wire envelopes shared by the client and the server.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Notification**: A [`Request`] without an `id`; no response is ever sent
//! - **Response**: A reply to a request, carrying exactly one of `result` or `error`
//!
//! # MCP-Specific Constraints
//!
//! - Request IDs must be strings or integers (never `null`)
//! - Request IDs must be unique within a session
//! - Error responses always echo the request ID when it can be recovered

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The JSON-RPC version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// The newest MCP protocol version this implementation speaks.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

/// Every MCP protocol version this implementation accepts, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[LATEST_PROTOCOL_VERSION, "2024-11-05"];

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "release-mcp";

/// Standard method names.
pub mod methods {
    /// Capability negotiation.
    pub const INITIALIZE: &str = "initialize";
    /// Sent by the client once `initialize` has completed.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Sent by either side to abandon an in-flight call.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Sent by the server while a long-running call makes progress.
    pub const PROGRESS: &str = "notifications/progress";
    /// Liveness check.
    pub const PING: &str = "ping";
    /// Lists registered tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invokes a tool by name.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Lists registered resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Reads a resource by URI.
    pub const RESOURCES_READ: &str = "resources/read";
    /// Lists registered prompts.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Renders a prompt by name.
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A JSON-RPC 2.0 request or notification.
///
/// The presence of `id` is the only thing that separates a call from a
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Request identifier; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a call that expects a response.
    #[must_use]
    pub fn call(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Creates a notification; no response will be sent for it.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Returns `true` if this request carries no identifier.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }
}

/// A JSON-RPC 2.0 response.
///
/// Exactly one of `result` and `error` is set by the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Always "2.0".
    pub jsonrpc: String,

    /// The request ID this response corresponds to; `null` only when the
    /// request was too malformed to recover it.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// The result of the method call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// The error, if the method call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Creates a new success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates a new error response.
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns `true` if this response carries an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Standard JSON-RPC 2.0 error codes used by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The method, tool, resource, or prompt does not exist.
    MethodNotFound,
    /// Invalid method parameters, or a malformed envelope.
    InvalidParams,
    /// A handler failed while producing a result.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// An unknown method, tool, resource, or prompt; `name` travels as data.
    #[must_use]
    pub fn method_not_found(name: &str) -> Self {
        Self::with_message(ErrorCode::MethodNotFound, format!("Method not found: {name}"))
            .with_data(Value::String(name.to_string()))
    }

    /// Invalid parameters.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidParams, message)
    }

    /// A malformed envelope; the parse failure travels as data.
    #[must_use]
    pub fn malformed(detail: impl std::fmt::Display) -> Self {
        Self::with_message(ErrorCode::InvalidParams, "Malformed message")
            .with_data(Value::String(detail.to_string()))
    }

    /// A handler failure; the underlying message travels as data.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InternalError).with_data(Value::String(message.into()))
    }

    /// Returns `true` if this error has the given code.
    #[must_use]
    pub const fn is(&self, code: ErrorCode) -> bool {
        self.code == code.code()
    }
}

/// Parses a JSON string into an incoming request or notification.
///
/// # Errors
///
/// Returns an error [`Response`] ready to be written back if the frame is not
/// a valid envelope. The request ID is echoed whenever it can be recovered.
pub fn parse_message(json: &str) -> Result<Request, Response> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| Response::failure(None, RpcError::malformed(e)))?;

    let obj = value.as_object().ok_or_else(|| {
        Response::failure(None, RpcError::malformed("message must be a JSON object"))
    })?;

    let id = match obj.get("id") {
        None => None,
        Some(Value::Null) => {
            return Err(Response::failure(
                None,
                RpcError::malformed("id must be a string or an integer"),
            ));
        }
        Some(raw) => Some(serde_json::from_value::<RequestId>(raw.clone()).map_err(|_| {
            Response::failure(None, RpcError::malformed("id must be a string or an integer"))
        })?),
    };

    let request: Request =
        serde_json::from_value(value).map_err(|e| Response::failure(id.clone(), RpcError::malformed(e)))?;

    if let Some(problem) = request.validate() {
        return Err(Response::failure(id, RpcError::malformed(problem)));
    }

    Ok(request)
}

/// A frame read by a client from a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A reply to one of the client's calls.
    Response(Response),
    /// A message initiated by the server, such as a progress notification.
    ServerMessage(Request),
}

/// Classifies a line received by a client.
///
/// Anything carrying a `method` was initiated by the server; everything else
/// is treated as a response.
///
/// # Errors
///
/// Returns an error if the line is not a JSON envelope.
pub fn parse_frame(json: &str) -> Result<Frame, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    if value.get("method").is_some() {
        Ok(Frame::ServerMessage(serde_json::from_value(value)?))
    } else {
        Ok(Frame::Response(serde_json::from_value(value)?))
    }
}
