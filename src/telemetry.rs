// src/telemetry.rs
// Per-call telemetry events. Emission is fire-and-forget: a slow or failing
// telemetry sink must never delay a tool response.

use crate::config::{TelemetryConfig, TelemetryEnv};
use serde::Serialize;
use tracing::debug;

const PROD_ENDPOINT: &str = "https://telemetry.apify.com/v1/mcp-events";
const DEV_ENDPOINT: &str = "https://telemetry.dev.apify.com/v1/mcp-events";

/// One event per tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub tool_name: String,
    pub session_id: String,
    pub transport: &'static str,
    pub protocol_version: Option<String>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub duration_ms: u64,
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Clone)]
pub struct Telemetry {
    http: reqwest::Client,
    endpoint: &'static str,
}

impl Telemetry {
    /// Build the sink, or None when telemetry is disabled.
    pub fn from_config(config: &TelemetryConfig, http: reqwest::Client) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let endpoint = match config.env {
            TelemetryEnv::Prod => PROD_ENDPOINT,
            TelemetryEnv::Dev => DEV_ENDPOINT,
        };
        Some(Self { http, endpoint })
    }

    /// Emit one event. Errors are swallowed with a debug log.
    pub fn emit(&self, event: TelemetryEvent) {
        let http = self.http.clone();
        let endpoint = self.endpoint;
        tokio::spawn(async move {
            let request = http
                .post(endpoint)
                .timeout(crate::http::FAST_TIMEOUT)
                .json(&event);
            if let Err(e) = request.send().await {
                debug!(error = %e, "Telemetry emit failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_config_yields_no_sink() {
        let config = TelemetryConfig {
            enabled: false,
            env: TelemetryEnv::Prod,
        };
        assert!(Telemetry::from_config(&config, reqwest::Client::new()).is_none());
    }

    #[test]
    fn test_env_selects_endpoint() {
        let prod = Telemetry::from_config(
            &TelemetryConfig {
                enabled: true,
                env: TelemetryEnv::Prod,
            },
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(prod.endpoint, PROD_ENDPOINT);

        let dev = Telemetry::from_config(
            &TelemetryConfig {
                enabled: true,
                env: TelemetryEnv::Dev,
            },
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(dev.endpoint, DEV_ENDPOINT);
    }
}
