//! In-process transport that hands envelopes straight to a dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::mcp::dispatch::Dispatcher;
use crate::mcp::protocol::{Request, Response};
use crate::mcp::transport::Transport;

/// Delivers requests to a [`Dispatcher`] in the same process.
///
/// Envelopes still pass through their wire encoding so that the server sees
/// exactly what a remote client would send.
pub struct LoopbackTransport {
    dispatcher: Arc<Dispatcher>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    /// Creates a transport bound to `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let line = serde_json::to_string(request).map_err(TransportError::Encode)?;
        let response = self.dispatcher.handle_line(&line).await;

        // Notifications never get an answer, even a malformed-message one.
        if request.is_notification() {
            return Ok(None);
        }
        Ok(response)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
