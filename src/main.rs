// src/main.rs
// Actors MCP Server - Apify Actors as a dynamic MCP tool surface

use actors_mcp::config::TransportType;
use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use actors_mcp::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up APIFY_TOKEN and friends from a local .env, if any
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Quiet on stdio: the protocol owns stdout, and stderr noise confuses
    // some MCP hosts
    let log_level = match cli.serve.transport {
        TransportType::Stdio => Level::WARN,
        TransportType::Http | TransportType::Sse => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => {
            let host = cli.serve.host.clone();
            let port = cli.serve.port;
            let config = cli.serve.into_config();
            actors_mcp::cli::run_server(config, host, port).await?;
        }
    }

    Ok(())
}
