// src/cli/serve.rs
// Server initialization and main loops for both transports.

use crate::config::{Config, TransportType};
use crate::mcp::{ActorsMcpServer, ServerState};
use anyhow::Result;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Build the shared state, load the tool set, and run the configured
/// transport until shutdown.
pub async fn run_server(config: Config, host: String, port: u16) -> Result<()> {
    config.log_warnings();
    let transport = config.transport;

    let state = Arc::new(ServerState::new(config));
    state.load_tools().await?;

    // Mirror registry changes into the log; an external deployment can swap
    // this hook for shared-state persistence.
    state
        .registry
        .register_change_handler(Box::new(|names| {
            debug!(tools = names.len(), "Tool set changed");
        }))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let result = match transport {
        TransportType::Stdio => serve_stdio(state.clone()).await,
        TransportType::Http | TransportType::Sse => serve_http(state.clone(), host, port).await,
    };

    // Teardown: drop tools and detach the change hook
    state.close().await;
    let _ = state.registry.unregister_change_handler();
    result
}

/// Stdio transport: one session for the lifetime of the process, with a
/// generated session id.
async fn serve_stdio(state: Arc<ServerState>) -> Result<()> {
    let server = ActorsMcpServer::new(state);
    info!(session_id = %server.session_id, "Serving MCP over stdio");

    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;

    let cancel_token = service.cancellation_token();
    tokio::select! {
        result = service.waiting() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
            cancel_token.cancel();
        }
    }
    Ok(())
}

/// Streamable HTTP transport: the service factory creates a server (and a
/// session id) per MCP session; heavy state is shared.
async fn serve_http(state: Arc<ServerState>, host: String, port: u16) -> Result<()> {
    let shutdown = CancellationToken::new();

    let factory_state = state.clone();
    let service = StreamableHttpService::new(
        move || Ok(ActorsMcpServer::new(factory_state.clone())),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            sse_keep_alive: Some(Duration::from_secs(15)),
            stateful_mode: true,
            cancellation_token: shutdown.clone(),
            ..Default::default()
        },
    );

    let app = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!(host = %host, port, "Serving MCP over streamable HTTP at /mcp");

    let sigint_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received SIGINT, shutting down");
            sigint_shutdown.cancel();
        })
        .await?;
    Ok(())
}
