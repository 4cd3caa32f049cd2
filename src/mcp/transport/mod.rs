//! Transports carrying envelopes between client and server.
//!
//! Every client-side transport implements [`Transport`]: it sends one
//! envelope and, for calls, returns the matching response. Notifications
//! return `Ok(None)` without waiting for anything.
//!
//! - [`StreamTransport`]: newline-delimited JSON over a byte stream, usually a
//!   child process's stdio
//! - [`HttpTransport`]: one HTTP POST per envelope
//! - [`LoopbackTransport`]: in-process delivery to a [`Dispatcher`](crate::mcp::dispatch::Dispatcher)
//!
//! The server side of the stream framing is [`StdioTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TransportError;
use crate::mcp::protocol::{Request, Response};

pub mod http;
pub mod loopback;
pub mod stdio;
pub mod stream;

pub use http::HttpTransport;
pub use loopback::LoopbackTransport;
pub use stdio::StdioTransport;
pub use stream::StreamTransport;

/// Moves envelopes to a server and brings responses back.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one envelope.
    ///
    /// Returns the response for a call and `None` for a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope could not be delivered or the
    /// response could not be read.
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError>;

    /// Releases the transport. Later sends fail with [`TransportError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the underlying resources failed.
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError> {
        (**self).send(request).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError> {
        (**self).send(request).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

/// Serialises an envelope as one newline-terminated frame.
///
/// `serde_json` escapes control characters inside strings, so the encoded
/// body never contains a raw newline.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] if serialisation fails.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, TransportError> {
    let mut line = serde_json::to_string(message).map_err(TransportError::Encode)?;
    debug_assert!(!line.contains('\n'), "frames must not contain embedded newlines");
    line.push('\n');
    Ok(line)
}
