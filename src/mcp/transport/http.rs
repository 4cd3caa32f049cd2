//! HTTP transport: one POST per envelope.
//!
//! The request body is the encoded envelope. A 2xx body is decoded as the
//! response; for notifications the body is ignored and `202 Accepted` is the
//! usual answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::error::TransportError;
use crate::mcp::protocol::{Request, Response};
use crate::mcp::transport::Transport;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A client transport that POSTs each envelope to one endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Creates a transport for `endpoint` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client could not be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Creates a transport for `endpoint` with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client could not be built.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let body = serde_json::to_vec(request).map_err(TransportError::Encode)?;
        let resp = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        if request.is_notification() {
            return Ok(None);
        }

        let bytes = resp.bytes().await?;
        tracing::debug!(status = %status, len = bytes.len(), "HTTP response received");
        let response = serde_json::from_slice(&bytes).map_err(TransportError::Decode)?;
        Ok(Some(response))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
