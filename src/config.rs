// src/config.rs
// Configuration envelope - single source of truth for CLI flags and env vars

use std::time::Duration;
use tracing::warn;

/// Transport framing selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TransportType {
    #[default]
    Stdio,
    Http,
    /// Legacy SSE framing; served by the same streamable-HTTP stack.
    Sse,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Stdio => "stdio",
            TransportType::Http => "http",
            TransportType::Sse => "sse",
        }
    }
}

/// UI mode selects mode-variant tools, the `ui` tool category, and whether
/// `openai/*` metadata survives the tool-list projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Default,
    Openai,
}

impl UiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiMode::Default => "default",
            UiMode::Openai => "openai",
        }
    }
}

/// Telemetry destination environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TelemetryEnv {
    #[default]
    Prod,
    Dev,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub env: TelemetryEnv,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            env: TelemetryEnv::Prod,
        }
    }
}

/// Default per-call timeout for synchronous tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Server configuration assembled from CLI arguments and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportType,
    pub ui_mode: UiMode,
    /// Tool selectors: category names, internal tool names, or Actor ids.
    /// `None` means "not specified" (defaults apply); `Some(vec![])` means
    /// the caller explicitly asked for no tools.
    pub tools: Option<Vec<String>>,
    /// Explicit Actor list; same None/empty semantics as `tools`.
    pub actors: Option<Vec<String>>,
    pub enable_adding_actors: bool,
    pub skyfire_mode: bool,
    pub allow_unauth: bool,
    pub telemetry: TelemetryConfig,
    /// Apify API token (APIFY_TOKEN). Absent only in unauthenticated mode.
    pub token: Option<String>,
    pub tool_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportType::Stdio,
            ui_mode: UiMode::Default,
            tools: None,
            actors: None,
            enable_adding_actors: false,
            skyfire_mode: false,
            allow_unauth: false,
            telemetry: TelemetryConfig::default(),
            token: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl Config {
    /// Read the API token from the environment, filtering empty values.
    pub fn token_from_env() -> Option<String> {
        std::env::var("APIFY_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    /// Validate the assembled configuration, returning warnings for
    /// combinations that degrade functionality without being fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.token.is_none() && !self.allow_unauth {
            warnings.push(
                "No APIFY_TOKEN configured and unauthenticated mode is off; \
                 every tool call will fail. Set APIFY_TOKEN or pass --allow-unauth."
                    .to_string(),
            );
        }
        if self.token.is_none() && self.skyfire_mode {
            warnings.push("Skyfire mode has no effect without an API token".to_string());
        }
        if self.ui_mode == UiMode::Openai && self.transport == TransportType::Stdio {
            warnings.push(
                "openai UI mode over stdio: widget resources are resolved but most \
                 stdio clients ignore them"
                    .to_string(),
            );
        }

        warnings
    }

    /// Log validation warnings through tracing.
    pub fn log_warnings(&self) {
        for warning in self.validate() {
            warn!("{}", warning);
        }
    }
}

/// Split a comma-separated selector list, trimming and dropping empties.
/// An empty input string yields an empty vector (explicit "none").
pub fn parse_selector_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector_list() {
        assert_eq!(
            parse_selector_list("actors, docs ,,fetch-apify-docs"),
            vec!["actors", "docs", "fetch-apify-docs"]
        );
        assert!(parse_selector_list("").is_empty());
        assert!(parse_selector_list(" , ,").is_empty());
    }

    #[test]
    fn test_validate_warns_without_token() {
        let config = Config::default();
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn test_validate_quiet_with_token() {
        let config = Config {
            token: Some("apify_api_x".into()),
            ..Config::default()
        };
        assert!(config.validate().is_empty());
    }
}
