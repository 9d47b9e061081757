// src/tools/runs.rs
// Run lifecycle tools: inspect, list, abort, and read logs.

use crate::error::{Result, ServerError};
use crate::mcp::ServerState;
use crate::tools::{ToolCallFrame, ToolOutput};
use crate::utils::truncate;
use serde::Deserialize;
use serde_json::{Value, json};

/// Cap on log content returned inline.
const LOG_MAX_CHARS: usize = 20_000;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetActorRunRequest {
    #[schemars(description = "Id of the Actor run")]
    pub run_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetActorRunListRequest {
    #[schemars(description = "Result offset for paging")]
    pub offset: Option<u32>,
    #[schemars(description = "Maximum number of runs to return (default 10, max 100)")]
    pub limit: Option<u32>,
}

fn run_json(run: &crate::apify::Run) -> Value {
    json!({
        "runId": run.id,
        "actorId": run.act_id,
        "status": run.status.as_str(),
        "statusMessage": run.status_message,
        "startedAt": run.started_at,
        "finishedAt": run.finished_at,
        "defaultDatasetId": run.default_dataset_id,
        "defaultKeyValueStoreId": run.default_key_value_store_id,
    })
}

/// `get-actor-run` handler.
pub async fn get_actor_run(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: GetActorRunRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let run = state.apify()?.get_run(&request.run_id).await?;
    let details = run_json(&run);
    Ok(ToolOutput::structured(
        serde_json::to_string_pretty(&details)?,
        details,
    ))
}

/// `get-actor-run-list` handler.
pub async fn get_actor_run_list(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: GetActorRunListRequest =
        serde_json::from_value(Value::Object(frame.args.clone()))
            .map_err(|e| ServerError::InvalidInput(e.to_string()))?;
    let limit = request.limit.unwrap_or(10).min(100);
    let offset = request.offset.unwrap_or(0);

    let runs = state.apify()?.list_runs(offset, limit).await?;
    let items: Vec<Value> = runs.iter().map(run_json).collect();
    Ok(ToolOutput::structured(
        serde_json::to_string_pretty(&items)?,
        json!({ "runs": items }),
    ))
}

/// `abort-actor-run` handler.
pub async fn abort_actor_run(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: GetActorRunRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let run = state.apify()?.abort_run(&request.run_id, false).await?;
    let details = run_json(&run);
    Ok(ToolOutput::structured(
        format!("Run {} is now {}", run.id, run.status.as_str()),
        details,
    ))
}

/// `get-actor-log` handler.
pub async fn get_actor_log(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: GetActorRunRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let log = state.apify()?.get_run_log(&request.run_id).await?;
    Ok(ToolOutput::text(truncate(&log, LOG_MAX_CHARS)))
}
