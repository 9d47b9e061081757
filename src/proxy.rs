// src/proxy.rs
// Proxying of Actors that are themselves MCP servers (standby web servers).
//
// Each remote tool becomes a local entry whose handler opens a client to the
// same URL, forwards the call under the origin name, and closes the client.
// Local names are prefixed with a hash of the server URL so they stay stable
// and collision-resistant across sessions.

use crate::error::{Result, ServerError};
use crate::tools::{
    MAX_TOOL_NAME_LENGTH, TaskSupport, ToolEntry, ToolKind, ToolOutput, ToolSpec,
};
use rmcp::model::{CallToolRequestParams, ClientInfo};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{RoleClient, serve_client};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Length of the hex prefix of SHA-256(server URL) used in local tool names.
const SERVER_ID_HEX_LEN: usize = 12;

/// Timeout for a forwarded remote tool call.
const REMOTE_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Resolve the standby MCP server URL for an Actor.
pub fn resolve_server_url(owner_or_id: &str, web_server_path: &str) -> String {
    let host = match owner_or_id.split_once('/') {
        Some((owner, name)) => format!("{owner}--{name}"),
        None => owner_or_id.to_string(),
    };
    let path = if web_server_path.starts_with('/') {
        web_server_path.to_string()
    } else {
        format!("/{web_server_path}")
    };
    format!("https://{host}.apify.actor{path}")
}

/// Stable hex id of a server URL.
pub fn server_id(server_url: &str) -> String {
    let digest = Sha256::digest(server_url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..SERVER_ID_HEX_LEN].to_string()
}

/// Local tool name for a remote tool: `prefix-originName`, clamped to the
/// overall name limit.
pub fn prefixed_tool_name(server_id: &str, origin_name: &str) -> String {
    let mut name = format!("{server_id}-{origin_name}");
    name.truncate(MAX_TOOL_NAME_LENGTH);
    name
}

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: Default::default(),
        client_info: rmcp::model::Implementation {
            name: "actors-mcp-server".into(),
            title: Some("Actors MCP Server".into()),
            version: env!("CARGO_PKG_VERSION").into(),
            description: None,
            icons: None,
            website_url: None,
        },
    }
}

async fn connect(
    server_url: &str,
    token: &str,
) -> Result<rmcp::service::RunningService<RoleClient, ClientInfo>> {
    let config =
        StreamableHttpClientTransportConfig::with_uri(server_url.to_string()).auth_header(token);
    let transport = StreamableHttpClientTransport::from_config(config);
    serve_client(client_info(), transport)
        .await
        .map_err(|e| ServerError::Other(format!("MCP client init for '{server_url}': {e}")))
}

/// Connect to a remote MCP server once, enumerate its tools, and wrap each as
/// a local entry. Requires authentication; callers skip unauthenticated
/// sessions before getting here. Connection failure is returned so the
/// caller can log and skip this server while other Actors proceed.
pub async fn load_remote_tools(server_url: &str, token: &str) -> Result<Vec<ToolEntry>> {
    let service = connect(server_url, token).await?;
    let peer = service.peer().clone();

    let remote_tools = peer
        .list_all_tools()
        .await
        .map_err(|e| ServerError::Other(format!("list tools from '{server_url}': {e}")))?;

    let id = server_id(server_url);
    let mut entries = Vec::new();
    for tool in remote_tools {
        let origin_name = tool.name.to_string();
        let input_schema = Value::Object(tool.input_schema.as_ref().clone());
        let spec = ToolSpec {
            name: prefixed_tool_name(&id, &origin_name),
            description: tool
                .description
                .as_deref()
                .unwrap_or("Remote MCP tool")
                .to_string(),
            input_schema,
            output_schema: tool
                .output_schema
                .as_ref()
                .map(|s| Value::Object(s.as_ref().clone())),
            annotations: tool.annotations.clone(),
            meta: None,
            task_support: TaskSupport::None,
        };
        let kind = ToolKind::ActorMcp {
            origin_name: origin_name.clone(),
            server_id: id.clone(),
            server_url: server_url.to_string(),
        };
        match ToolEntry::new(spec, kind) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(
                    server = server_url,
                    tool = origin_name,
                    error = %e,
                    "Skipping remote tool"
                );
            }
        }
    }

    debug!(server = server_url, count = entries.len(), "Wrapped remote MCP tools");

    // The connection was only needed for enumeration; forwarded calls open
    // their own client.
    drop(service);
    Ok(entries)
}

/// Forward a call to the remote server under the origin tool name.
pub async fn call_remote_tool(
    server_url: &str,
    origin_name: &str,
    token: &str,
    args: Map<String, Value>,
) -> Result<ToolOutput> {
    let service = connect(server_url, token).await?;
    let peer = service.peer().clone();

    let result = tokio::time::timeout(
        REMOTE_CALL_TIMEOUT,
        peer.call_tool(CallToolRequestParams {
            meta: None,
            name: origin_name.to_string().into(),
            arguments: Some(args),
            task: None,
        }),
    )
    .await
    .map_err(|_| {
        ServerError::Other(format!(
            "remote tool call timed out after {}s",
            REMOTE_CALL_TIMEOUT.as_secs()
        ))
    })?
    .map_err(|e| ServerError::Other(format!("remote tool call failed: {e}")))?;

    let text: String = result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.to_string()))
        .collect::<Vec<_>>()
        .join("\n");

    drop(service);

    Ok(ToolOutput {
        text,
        structured: result.structured_content,
        is_error: result.is_error.unwrap_or(false),
        tools_changed: false,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_server_url() {
        assert_eq!(
            resolve_server_url("apify/actors-mcp-server", "/mcp"),
            "https://apify--actors-mcp-server.apify.actor/mcp"
        );
        assert_eq!(
            resolve_server_url("nwua9Gu5YrADL7ZDj", "mcp"),
            "https://nwua9Gu5YrADL7ZDj.apify.actor/mcp"
        );
    }

    #[test]
    fn test_server_id_is_stable_and_short() {
        let a = server_id("https://a.apify.actor/mcp");
        let b = server_id("https://a.apify.actor/mcp");
        let c = server_id("https://b.apify.actor/mcp");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), SERVER_ID_HEX_LEN);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_prefixed_tool_name_clamped() {
        let id = server_id("https://x.apify.actor/mcp");
        let name = prefixed_tool_name(&id, "search");
        assert_eq!(name, format!("{id}-search"));

        let long = prefixed_tool_name(&id, &"t".repeat(100));
        assert_eq!(long.len(), MAX_TOOL_NAME_LENGTH);
    }
}
