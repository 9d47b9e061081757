// src/tools/dynamic.rs
// Meta-tools that mutate the registry mid-session. Exposed only when
// enable-adding-actors is on.

use crate::error::{Result, ServerError};
use crate::mcp::ServerState;
use crate::tools::catalog;
use crate::tools::{ToolCallFrame, ToolOutput};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddActorRequest {
    #[schemars(description = "Actor to add as a tool, as owner/name or Actor id")]
    pub actor: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RemoveActorRequest {
    #[schemars(description = "Name of the tool to remove (as listed by tools/list)")]
    pub tool: String,
}

fn require_adding_enabled(state: &ServerState) -> Result<()> {
    if !state.config.enable_adding_actors {
        return Err(ServerError::InvalidInput(
            "adding Actors dynamically is disabled; start the server with \
             --enable-adding-actors"
                .to_string(),
        ));
    }
    Ok(())
}

/// `add-actor` handler: load the Actor (or the tools of its MCP server) and
/// upsert into the registry.
pub async fn add_actor(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    require_adding_enabled(state)?;
    let request: AddActorRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let entries = catalog::load_actor_entries(state, std::slice::from_ref(&request.actor)).await;
    if entries.is_empty() {
        return Err(ServerError::NotFound(format!(
            "Actor {:?} could not be loaded as a tool; check the name with store-search",
            request.actor
        )));
    }

    let names: Vec<String> = entries.iter().map(|e| e.name().to_string()).collect();
    state.registry.upsert(entries, true).await;

    Ok(ToolOutput::structured(
        format!("Added tools: {}", names.join(", ")),
        json!({ "added": names }),
    )
    .with_tools_changed())
}

/// `remove-actor` handler.
pub async fn remove_actor(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    require_adding_enabled(state)?;
    let request: RemoveActorRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    // Only dynamically added tools may be removed
    match state.registry.get(&request.tool).await {
        None => {
            return Err(ServerError::NotFound(format!(
                "no tool named {:?}",
                request.tool
            )));
        }
        Some(entry) => {
            if matches!(entry.kind, crate::tools::ToolKind::Internal) {
                return Err(ServerError::InvalidInput(format!(
                    "{:?} is a built-in tool and cannot be removed",
                    request.tool
                )));
            }
        }
    }

    let removed = state.registry.remove(&[request.tool.clone()], true).await;
    Ok(ToolOutput::structured(
        format!("Removed tools: {}", removed.join(", ")),
        json!({ "removed": removed }),
    )
    .with_tools_changed())
}
