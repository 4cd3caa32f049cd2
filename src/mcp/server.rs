//! Stdio message loop.
//!
//! The server reads one frame at a time and processes it to completion
//! before reading the next:
//!
//! 1. **Dispatch**: the frame is handed to the [`Dispatcher`]
//! 2. **Progress**: notifications the handler emits are written as they arrive
//! 3. **Reply**: the response, if any, is written last
//!
//! The loop ends when the client closes stdin, or on SIGINT/SIGTERM when
//! started with [`McpServer::run`].

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, Stdin, Stdout};
use tokio::sync::mpsc;

use crate::mcp::dispatch::Dispatcher;
use crate::mcp::progress::ChannelSink;
use crate::mcp::protocol::Request;
use crate::mcp::transport::StdioTransport;

/// The MCP server bound to a line-framed stream.
pub struct McpServer<R, W> {
    transport: StdioTransport<R, W>,
    dispatcher: Arc<Dispatcher>,
    notifications: mpsc::UnboundedReceiver<Request>,
}

impl McpServer<Stdin, Stdout> {
    /// Creates a server on the process's stdin and stdout.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::from_parts(StdioTransport::new(), dispatcher)
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server on an arbitrary transport.
    ///
    /// A channel-backed progress sink is attached to `dispatcher`, replacing
    /// any sink it already had.
    pub fn from_parts(transport: StdioTransport<R, W>, dispatcher: Dispatcher) -> Self {
        let (sink, notifications) = ChannelSink::new();
        Self {
            transport,
            dispatcher: Arc::new(dispatcher.with_progress_sink(Arc::new(sink))),
            notifications,
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serves frames until the peer closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> io::Result<()> {
        loop {
            let line_result = self.transport.read_line().await;
            if self.handle_transport_result(line_result).await? {
                return Ok(());
            }
        }
    }

    /// Serves frames until the peer closes the stream or a shutdown signal
    /// arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        self.run_with_shutdown().await
    }

    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result of one read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(&mut self, line_result: io::Result<Option<String>>) -> io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("Client closed the stream");
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.process_line(&line).await?;
        Ok(false)
    }

    /// Dispatches one frame, interleaving progress writes with the handler.
    async fn process_line(&mut self, line: &str) -> io::Result<()> {
        let Self {
            transport,
            dispatcher,
            notifications,
        } = self;

        let response = {
            let dispatch = dispatcher.handle_line(line);
            tokio::pin!(dispatch);

            loop {
                tokio::select! {
                    response = &mut dispatch => break response,
                    Some(notification) = notifications.recv() => {
                        transport.write_notification(&notification).await?;
                    }
                }
            }
        };

        // Anything emitted after the last poll still precedes the reply.
        while let Ok(notification) = notifications.try_recv() {
            transport.write_notification(&notification).await?;
        }

        if let Some(response) = response {
            transport.write_response(&response).await?;
        }

        Ok(())
    }
}
