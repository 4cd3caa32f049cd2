//! HTTP front-end for the dispatcher.
//!
//! `POST /mcp` takes one envelope per request body. Calls are answered with
//! `200 OK` and the response envelope; notifications with `202 Accepted` and
//! an empty body. `GET /health` reports liveness.
//!
//! Progress notifications have no return path over plain POST, so tool calls
//! served here run without a progress sink.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use crate::mcp::dispatch::Dispatcher;

/// Path of the JSON-RPC endpoint.
pub const MCP_PATH: &str = "/mcp";

/// Builds the router serving `dispatcher`.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route(MCP_PATH, post(handle_mcp))
        .with_state(dispatcher)
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn handle_mcp(State(dispatcher): State<Arc<Dispatcher>>, body: String) -> HttpResponse {
    match dispatcher.handle_line(&body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Binds `addr` and serves in a background task.
///
/// Returns the bound address, which differs from `addr` when port 0 was
/// requested.
///
/// # Errors
///
/// Returns an error if the address could not be bound.
pub async fn spawn_http(dispatcher: Arc<Dispatcher>, addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "HTTP server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(dispatcher)).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    Ok(local_addr)
}

/// Binds `addr` and serves until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the address could not be bound or serving fails.
pub async fn serve_http(dispatcher: Arc<Dispatcher>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
