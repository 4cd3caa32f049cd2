//! Error types for release-mcp.
//!
//! Each layer has its own error enum so callers can tell a broken pipe from a
//! server-side failure:
//!
//! - [`TransportError`]: I/O, framing, and HTTP failures. Never retried here.
//! - [`ClientError`]: everything a client call can return, including RPC
//!   errors reported by the remote side.
//! - [`HandlerError`]: failures raised by tool, resource, and prompt handlers.
//!   The dispatcher converts these into error responses.

use std::path::PathBuf;

use thiserror::Error;

use crate::mcp::protocol::{RequestId, RpcError};
use crate::release::ReleaseState;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while moving envelopes across a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Reading or writing the underlying stream failed.
    #[error("transport I/O failed")]
    Io(#[from] std::io::Error),

    /// The outgoing envelope could not be serialised.
    #[error("failed to encode message")]
    Encode(#[source] serde_json::Error),

    /// The incoming frame was not a valid response envelope.
    #[error("failed to decode response frame")]
    Decode(#[source] serde_json::Error),

    /// The HTTP round trip failed before a status was received.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// The HTTP server answered with a non-2xx status.
    #[error("HTTP status {status}")]
    Status {
        /// The status code returned by the server.
        status: u16,
    },

    /// The remote side closed the stream before a response arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The transport was closed locally and rejects further sends.
    #[error("transport is closed")]
    Closed,

    /// The transport could not be set up.
    #[error("transport setup failed: {0}")]
    Setup(String),
}

/// Errors returned by client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The transport failed; the call was not retried.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with an RPC error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Parameters could not be encoded or the result could not be decoded.
    #[error("failed to convert payload")]
    Payload(#[from] serde_json::Error),

    /// A tool reported failure, or returned nothing decodable.
    #[error("tool '{tool}' failed: {message}")]
    Tool {
        /// Name of the tool that was called.
        tool: String,
        /// Message supplied by the server.
        message: String,
    },

    /// The server answered a call with a different identifier.
    #[error("response id {actual:?} does not match request id {expected}")]
    MismatchedId {
        /// The identifier that was sent.
        expected: RequestId,
        /// The identifier that came back.
        actual: Option<RequestId>,
    },

    /// The response had neither a result nor an error.
    #[error("response carried no result")]
    MissingResult,

    /// The client was closed.
    #[error("client is closed")]
    Closed,

    /// A session operation was attempted before `initialize`.
    #[error("client is not initialized")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("client is already initialized")]
    AlreadyInitialized,
}

/// Errors raised by tool, resource, and prompt handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The caller's arguments were missing or malformed.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler could not produce a result.
    #[error("{0}")]
    Failed(String),
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::Failed(e.to_string())
    }
}

/// Errors raised when delivering progress notifications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The receiving side of the sink has gone away.
    #[error("progress sink is closed")]
    Closed,
}

/// Errors raised by release store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be accessed.
    #[error("release store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by release state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The action is not allowed from the release's current state.
    #[error("cannot {action} a release that is {state}")]
    NotAllowed {
        /// The attempted action.
        action: &'static str,
        /// The state the release was in.
        state: ReleaseState,
    },

    /// A required text field was blank.
    #[error("{field} must not be empty")]
    Blank {
        /// Name of the field.
        field: &'static str,
    },

    /// Approval was requested before release notes were written.
    #[error("release {version} has no notes")]
    MissingNotes {
        /// Version of the release.
        version: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn rpc_error_is_transparent() {
        let error = ClientError::from(RpcError::method_not_found("release_frobnicate"));
        let msg = error.to_string();
        assert!(msg.contains("-32601"));
        assert!(msg.contains("Method not found"));
    }

    #[test]
    fn tool_error_carries_server_message() {
        let error = ClientError::Tool {
            tool: "release_approve".to_string(),
            message: "release is not planned".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "tool 'release_approve' failed: release is not planned"
        );
    }

    #[test]
    fn store_error_becomes_handler_failure() {
        let error = HandlerError::from(StoreError::Unavailable("disk full".to_string()));
        assert_eq!(
            error,
            HandlerError::Failed("release store unavailable: disk full".to_string())
        );
    }
}
