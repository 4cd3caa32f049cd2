//! Server side of the line-framed stream transport.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines and never contain one
//! - The server reads from stdin and writes to stdout
//! - stderr is left for logging

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::mcp::protocol::{Request, Response};

/// Reads request frames and writes response and notification frames.
pub struct StdioTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl StdioTransport<Stdin, Stdout> {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport<Stdin, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over an arbitrary reader and writer.
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Reads the next frame, without its line terminator.
    ///
    /// Returns `None` once the peer closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes a response frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_response(&mut self, response: &Response) -> io::Result<()> {
        let json = serde_json::to_string(response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_raw(&json).await
    }

    /// Writes a server-initiated notification frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_notification(&mut self, notification: &Request) -> io::Result<()> {
        let json = serde_json::to_string(notification)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_raw(&json).await
    }

    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(!json.contains('\n'), "frames must not contain embedded newlines");

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}
