// src/cli/mod.rs
// CLI surface: a thin shell that assembles the configuration envelope and
// boots the server core.

use crate::config::{
    Config, DEFAULT_TOOL_TIMEOUT, TelemetryConfig, TelemetryEnv, TransportType, UiMode,
};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

pub mod serve;

pub use serve::run_server;

#[derive(Parser)]
#[command(name = "actors-mcp")]
#[command(about = "MCP server exposing Apify Actors as a dynamic tool surface")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server (default)
    Serve,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Transport framing
    #[arg(long, value_enum, default_value_t = TransportType::Stdio)]
    pub transport: TransportType,

    /// Bind host for the HTTP transport
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port for the HTTP transport
    #[arg(long, default_value_t = 3001)]
    pub port: u16,

    /// UI mode: selects tool variants and widget metadata
    #[arg(long, value_enum, default_value_t = UiMode::Default)]
    pub ui_mode: UiMode,

    /// Tool selectors: categories, tool names, or Actor ids. Omit for the
    /// default set; pass an empty value for none.
    #[arg(long, value_delimiter = ',')]
    pub tools: Option<Vec<String>>,

    /// Actors to expose as tools; same empty semantics as --tools
    #[arg(long, value_delimiter = ',')]
    pub actors: Option<Vec<String>>,

    /// Expose add-actor / remove-actor meta-tools
    #[arg(long)]
    pub enable_adding_actors: bool,

    /// Skyfire payment-token flow
    #[arg(long)]
    pub skyfire_mode: bool,

    /// Allow running without APIFY_TOKEN (documentation tools only)
    #[arg(long)]
    pub allow_unauth: bool,

    /// Disable telemetry
    #[arg(long)]
    pub no_telemetry: bool,

    /// Telemetry destination
    #[arg(long, value_enum, default_value_t = TelemetryEnv::Prod)]
    pub telemetry_env: TelemetryEnv,

    /// Per-call timeout for synchronous tool execution, in seconds
    #[arg(long, default_value_t = DEFAULT_TOOL_TIMEOUT.as_secs())]
    pub tool_timeout_secs: u64,
}

impl ServeArgs {
    /// Assemble the configuration envelope. The API token comes from the
    /// environment, never from an argument.
    pub fn into_config(self) -> Config {
        Config {
            transport: self.transport,
            ui_mode: self.ui_mode,
            tools: self.tools,
            actors: self.actors,
            enable_adding_actors: self.enable_adding_actors,
            skyfire_mode: self.skyfire_mode,
            allow_unauth: self.allow_unauth,
            telemetry: TelemetryConfig {
                enabled: !self.no_telemetry,
                env: self.telemetry_env,
            },
            token: Config::token_from_env(),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
        }
    }
}
