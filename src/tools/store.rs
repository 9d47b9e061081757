// src/tools/store.rs
// Store discovery tools: search the Apify Store and fetch Actor details.
//
// The `-internal` variants are the openai-mode widget twins; they share the
// handlers and input schemas with the base tools.

use crate::error::{Result, ServerError};
use crate::mcp::ServerState;
use crate::tools::catalog;
use crate::tools::{ToolCallFrame, ToolOutput};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StoreSearchRequest {
    #[schemars(description = "Full-text search over Actor names, titles and descriptions")]
    pub search: String,
    #[schemars(description = "Maximum number of Actors to return (default 10, max 100)")]
    pub limit: Option<u32>,
    #[schemars(description = "Result offset for paging")]
    pub offset: Option<u32>,
    #[schemars(description = "Store category to filter by, e.g. AI, E_COMMERCE")]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FetchActorDetailsRequest {
    #[schemars(description = "Actor to describe, as owner/name or Actor id")]
    pub actor: String,
}

/// `store-search` handler.
pub async fn store_search(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: StoreSearchRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;
    let limit = request.limit.unwrap_or(10).min(100);
    let offset = request.offset.unwrap_or(0);

    let client = state.apify()?;
    let actors = client
        .search_store(&request.search, limit, offset, request.category.as_deref())
        .await?;

    let results: Vec<Value> = actors
        .iter()
        .map(|actor| {
            json!({
                "actor": format!("{}/{}", actor.username, actor.name),
                "title": actor.title,
                "description": actor.description,
                "totalRuns": actor.stats.as_ref().and_then(|s| s.total_runs),
                "pricing": actor.current_pricing_info,
            })
        })
        .collect();

    let text = if results.is_empty() {
        format!(
            "No Actors found for {:?}. Try a broader query.",
            request.search
        )
    } else {
        serde_json::to_string_pretty(&results)?
    };
    Ok(ToolOutput::structured(text, json!({ "actors": results })))
}

/// `fetch-actor-details` handler. Includes the normalized input schema so the
/// client can construct a valid `call-actor` input on the first attempt.
pub async fn fetch_actor_details(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: FetchActorDetailsRequest =
        serde_json::from_value(Value::Object(frame.args.clone()))
            .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let client = state.apify()?;
    let definition = catalog::actor_definition(client, &request.actor).await?;

    let details = json!({
        "actor": definition.full_name,
        "description": definition.description,
        "inputSchema": definition.input_schema,
        "defaultMemoryMbytes": definition.default_memory,
        "servesMcp": definition.web_server_mcp_path.is_some(),
    });
    let text = serde_json::to_string_pretty(&details)?;
    Ok(ToolOutput::structured(text, details))
}
