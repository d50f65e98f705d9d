//! # Relay MCP Server
//!
//! Model Context Protocol server bridging MCP clients to agents on a
//! remote messaging platform.
//!
//! ## Overview
//!
//! This binary exposes MCP tools for:
//! - Connection lifecycle (connect, disconnect, switch target)
//! - Messaging (fire-and-forget send, correlated send-and-wait)
//! - Reply consumption (wait for the next message)
//! - Introspection (state, configuration, agent directory)
//!
//! ## Architecture
//!
//! This is Layer 3 - the MCP server binary that ties together:
//! - relay-mcp-core: Core types
//! - relay-mcp-transport: Socket transport and directory client
//! - relay-mcp-session: Session lifecycle and reply correlation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use relay_mcp::RelayMcpServer;
use relay_mcp_core::{SessionConfig, SessionConfigPatch};

/// Everything main needs, gathered once at process entry.
///
/// The session engine never touches the environment; whatever it is
/// going to know has to be in here.
struct BootstrapConfig {
    session: SessionConfig,
    log_file: Option<PathBuf>,
}

fn parse_env_ms(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => {
            let ms = value
                .parse::<u64>()
                .with_context(|| format!("{name} must be an integer, got: {value}"))?;
            Ok(Some(ms))
        }
        Err(_) => Ok(None),
    }
}

/// Assemble the session configuration from an optional YAML file plus
/// environment overrides.
///
/// File values load first, `RELAY_*` variables override them, and the
/// merged result is validated before the engine ever sees it.
fn bootstrap_config() -> anyhow::Result<BootstrapConfig> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| std::env::var("RELAY_CONFIG").ok());

    let mut session = match &config_path {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("failed to load config file: {path}"))?,
        None => SessionConfig::default(),
    };

    let overrides = SessionConfigPatch {
        server_url: std::env::var("RELAY_SERVER_URL").ok(),
        user_id: std::env::var("RELAY_USER_ID").ok(),
        world_id: std::env::var("RELAY_WORLD_ID").ok(),
        target_id: std::env::var("RELAY_TARGET_ID").ok(),
        channel_id: std::env::var("RELAY_CHANNEL_ID").ok(),
        connect_timeout_ms: parse_env_ms("RELAY_CONNECT_TIMEOUT_MS")?,
        response_timeout_ms: parse_env_ms("RELAY_RESPONSE_TIMEOUT_MS")?,
    };
    session.apply(&overrides);
    session
        .validate()
        .context("invalid session configuration")?;

    Ok(BootstrapConfig {
        session,
        log_file: std::env::var("RELAY_LOG_FILE").ok().map(PathBuf::from),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bootstrap = bootstrap_config()?;

    // Initialize logging. Stdout carries the MCP protocol, so logs go to
    // stderr, or to a file when RELAY_LOG_FILE is set.
    let writer = match &bootstrap.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    tracing::info!(
        "Relay MCP Server starting: server='{}', target='{}'",
        bootstrap.session.server_url,
        bootstrap.session.target_id
    );

    // Create MCP server instance over a live socket transport
    let server = RelayMcpServer::new(bootstrap.session)?;
    let session = server.session();

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("Relay MCP Server running on stdio");

    // Run until the client goes away or we get a shutdown signal
    tokio::select! {
        result = service.waiting() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    session.disconnect();
    tracing::info!("Relay MCP Server shutting down");

    Ok(())
}
