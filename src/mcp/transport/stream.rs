//! Client side of the line-framed stream transport.
//!
//! One lock guards the write of a request and the read of its response, so
//! concurrent calls on a shared transport are serialised and every caller
//! reads its own reply. Server-initiated messages that arrive ahead of the
//! response are handed to an optional callback and skipped. Replies carrying
//! another call's id are left over from a call the caller abandoned, for
//! example through a timeout, and are discarded.

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::mcp::protocol::{parse_frame, Frame, Request, Response};
use crate::mcp::transport::{encode_line, Transport};

/// How long `close` waits for a spawned server to exit before killing it.
const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback for messages the server sends on its own initiative.
pub type NotificationHandler = Arc<dyn Fn(Request) + Send + Sync>;

struct Channel<R, W> {
    reader: BufReader<R>,
    writer: W,
}

/// A client transport over a pair of byte streams.
pub struct StreamTransport<R, W> {
    // `None` once closed.
    channel: Mutex<Option<Channel<R, W>>>,
    child: Mutex<Option<Child>>,
    on_notification: Option<NotificationHandler>,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a transport reading responses from `reader` and writing
    /// requests to `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            channel: Mutex::new(Some(Channel {
                reader: BufReader::new(reader),
                writer,
            })),
            child: Mutex::new(None),
            on_notification: None,
        }
    }

    /// Routes server-initiated messages, such as progress notifications,
    /// to `handler`.
    #[must_use]
    pub fn with_notification_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Request) + Send + Sync + 'static,
    {
        self.on_notification = Some(Arc::new(handler));
        self
    }

    async fn round_trip(
        &self,
        channel: &mut Channel<R, W>,
        request: &Request,
    ) -> Result<Option<Response>, TransportError> {
        let line = encode_line(request)?;
        channel.writer.write_all(line.as_bytes()).await?;
        channel.writer.flush().await?;

        if request.is_notification() {
            return Ok(None);
        }

        let mut buf = String::new();
        loop {
            buf.clear();
            if channel.reader.read_line(&mut buf).await? == 0 {
                return Err(TransportError::ConnectionClosed);
            }

            let frame = buf.trim();
            if frame.is_empty() {
                continue;
            }

            match parse_frame(frame).map_err(TransportError::Decode)? {
                // A reply to an earlier call that was abandoned mid-read.
                Frame::Response(response)
                    if response.id.is_some() && response.id != request.id =>
                {
                    tracing::debug!(id = ?response.id, "Discarding reply to an abandoned call");
                }
                Frame::Response(response) => return Ok(Some(response)),
                Frame::ServerMessage(message) => {
                    tracing::debug!(method = %message.method, "Received server message");
                    if let Some(handler) = &self.on_notification {
                        handler(message);
                    }
                }
            }
        }
    }
}

impl StreamTransport<ChildStdout, ChildStdin> {
    /// Spawns `program` and talks to it over its stdin and stdout.
    ///
    /// The child's stderr is inherited so its logs stay visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started.
    pub fn spawn<S: AsRef<OsStr>>(program: S, args: &[&str]) -> Result<Self, TransportError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Setup("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Setup("child stdout unavailable".to_string()))?;

        tracing::info!(pid = ?child.id(), "Spawned server process");

        let mut transport = Self::new(stdout, stdin);
        *transport.child.get_mut() = Some(child);
        Ok(transport)
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(TransportError::Closed)?;
        self.round_trip(channel, request).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Dropping the writer signals EOF to the server.
        drop(self.channel.lock().await.take());

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(CHILD_EXIT_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(status = ?status, "Server process exited"),
            Ok(Err(e)) => tracing::error!(error = %e, "Error waiting for server process"),
            Err(_) => {
                tracing::warn!("Timeout waiting for server process, killing");
                child.kill().await?;
            }
        }

        Ok(())
    }
}
