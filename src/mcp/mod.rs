//! Model Context Protocol (MCP) runtime: both the server and the client side.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          MCP Server                           │
//! │                                                               │
//! │   ┌─────────────┐    ┌─────────────┐    ┌───────────────┐     │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│   Registry    │     │
//! │   │ (stdio/http)│    │  (routing)  │    │  (handlers)   │     │
//! │   └─────────────┘    └─────────────┘    └───────────────┘     │
//! │          ▲                  │                   │             │
//! │          │                  ▼                   ▼             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌───────────────┐     │
//! │   │  Progress   │◀───│    Cache    │    │  Call scope   │     │
//! │   │   (sink)    │    │ (TTL, URIs) │    │  (progress)   │     │
//! │   └─────────────┘    └─────────────┘    └───────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`client`] module drives the same protocol against a remote server
//! through any [`transport::Transport`].
//!
//! # Protocol Version
//!
//! This implementation speaks MCP protocol versions 2025-03-26 and 2024-11-05.

pub mod cache;
pub mod client;
pub mod dispatch;
pub mod http;
pub mod progress;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

pub use cache::ResourceCache;
pub use client::Client;
pub use dispatch::Dispatcher;
pub use protocol::{Request, RequestId, Response, RpcError, LATEST_PROTOCOL_VERSION};
pub use registry::{Registry, ToolEffect};
pub use server::McpServer;
pub use transport::{HttpTransport, LoopbackTransport, StdioTransport, StreamTransport, Transport};
