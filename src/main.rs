//! release-mcp: MCP server for AI-assisted release management
//!
//! Serves release tools, resources, and prompts over stdio, or over HTTP when
//! `--http` is given.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

use release_mcp::config::{self, Config};
use release_mcp::mcp::cache::ResourceCache;
use release_mcp::mcp::dispatch::Dispatcher;
use release_mcp::mcp::http::serve_http;
use release_mcp::mcp::server::McpServer;
use release_mcp::release::{self, InMemoryStore, ReleaseService};

/// MCP server for AI-assisted release management.
///
/// Exposes tools to plan, approve, and publish releases, plus cached
/// resources describing the current release.
#[derive(Parser, Debug)]
#[command(name = "release-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Serve JSON-RPC over HTTP POST on this address instead of stdio
    #[arg(long, value_name = "ADDR")]
    http: Option<SocketAddr>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Startup notice written to stderr before serving.
fn license_notice() -> String {
    format!(
        "release-mcp {}  Copyright (C) 2026  The Embedded Society\n\
         This program comes with ABSOLUTELY NO WARRANTY.\n\
         This is free software, licensed under GPL-3.0-or-later.\n\
         Source: {}\n",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY"),
    )
}

/// Initialises the tracing subscriber. Logs go to stderr; stdout carries
/// protocol frames.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_dispatcher(cfg: &Config, cache: Arc<ResourceCache>) -> Dispatcher {
    let service = ReleaseService::new(Arc::new(InMemoryStore::new()), cfg.repository.clone());
    let dispatcher = Dispatcher::new(release::registry(Arc::new(service)), cache);

    match &cfg.server.instructions {
        Some(instructions) => dispatcher.with_instructions(instructions.clone()),
        None => dispatcher,
    }
}

/// Sweeps expired cache entries every `period`.
fn spawn_cache_cleanup(cache: Arc<ResourceCache>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = cache.cleanup();
            if removed > 0 {
                debug!(removed, "Removed expired cache entries");
            }
        }
    });
}

async fn serve(args: &Args, cfg: &Config) -> std::io::Result<()> {
    let cache = Arc::new(cfg.cache.build_cache());
    if let Some(period) = cfg.cache.cleanup_interval() {
        spawn_cache_cleanup(Arc::clone(&cache), period);
    }

    let dispatcher = build_dispatcher(cfg, cache);

    if let Some(addr) = args.http {
        info!(%addr, "Serving MCP over HTTP");
        serve_http(Arc::new(dispatcher), addr).await
    } else {
        info!("MCP server ready, waiting for client connection...");
        McpServer::new(dispatcher).run().await
    }
}

/// Entry point for the release-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!("{}", license_notice());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        repository = %cfg.repository.name,
        cache_enabled = cfg.cache.enabled,
        "Starting release-mcp server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&args, &cfg)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
