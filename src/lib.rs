//! release-mcp: an MCP runtime for release management.
//!
//! This library exposes release operations (tools), read-only release views
//! (resources), and prompt templates over JSON-RPC, and provides a client
//! that drives the same protocol against a remote server.
//!
//! # Architecture
//!
//! The runtime is split into protocol plumbing and release collaborators:
//!
//! - **Transports**: newline-framed streams (stdio, child processes) and
//!   HTTP POST, behind one `Transport` trait
//! - **Dispatch**: a method table built once at startup, with progress
//!   reporting and a TTL resource cache wrapped around handler calls
//! - **Release logic**: a small state machine and in-memory store, plugged in
//!   through the handler registry
//!
//! # Modules
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types
//! - [`mcp`] - MCP protocol implementation
//! - [`release`] - Release records, storage, and MCP handlers

pub mod config;
pub mod error;
pub mod mcp;
pub mod release;
