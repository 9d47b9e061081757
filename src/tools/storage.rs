// src/tools/storage.rs
// Storage tools: run output previews and direct dataset / key-value reads.

use crate::error::{Result, ServerError};
use crate::mcp::ServerState;
use crate::preview::{PREVIEW_CHAR_BUDGET, build_preview, infer_items_schema};
use crate::tools::{ToolCallFrame, ToolOutput};
use serde::Deserialize;
use serde_json::{Value, json};

/// Page cap for direct dataset reads.
const DATASET_ITEMS_MAX_LIMIT: u64 = 1_000;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetActorOutputRequest {
    #[schemars(description = "Id of the Actor run whose output to fetch")]
    pub run_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetDatasetItemsRequest {
    #[schemars(description = "Id of the dataset")]
    pub dataset_id: String,
    #[schemars(description = "Item offset for paging")]
    pub offset: Option<u64>,
    #[schemars(description = "Maximum number of items (default 100, max 1000)")]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetKeyValueRecordRequest {
    #[schemars(description = "Id of the key-value store")]
    pub store_id: String,
    #[schemars(description = "Key of the record to read")]
    pub record_key: String,
}

/// `get-actor-output` handler: a size-bounded preview of the run's default
/// dataset, with an inferred schema.
pub async fn get_actor_output(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: GetActorOutputRequest =
        serde_json::from_value(Value::Object(frame.args.clone()))
            .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let client = state.apify()?;
    let run = client.get_run(&request.run_id).await?;
    let dataset_id = run.default_dataset_id.clone().ok_or_else(|| {
        ServerError::NotFound(format!("run {} has no default dataset", run.id))
    })?;

    let items = client
        .dataset_items(&dataset_id, 0, DATASET_ITEMS_MAX_LIMIT)
        .await?;
    let item_count = items.len();
    let schema = infer_items_schema(&items);
    let preview = build_preview(items, &[], PREVIEW_CHAR_BUDGET);

    let output = json!({
        "runId": run.id,
        "runStatus": run.status.as_str(),
        "datasetId": dataset_id,
        "itemCount": item_count,
        "schema": schema,
        "previewItems": preview,
    });
    Ok(ToolOutput::structured(
        serde_json::to_string_pretty(&output)?,
        output,
    ))
}

/// `get-dataset-items` handler.
pub async fn get_dataset_items(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: GetDatasetItemsRequest =
        serde_json::from_value(Value::Object(frame.args.clone()))
            .map_err(|e| ServerError::InvalidInput(e.to_string()))?;
    let limit = request.limit.unwrap_or(100).min(DATASET_ITEMS_MAX_LIMIT);
    let offset = request.offset.unwrap_or(0);

    let items = state
        .apify()?
        .dataset_items(&request.dataset_id, offset, limit)
        .await?;
    let preview = build_preview(items, &[], PREVIEW_CHAR_BUDGET);

    let output = json!({
        "datasetId": request.dataset_id,
        "offset": offset,
        "count": preview.len(),
        "items": preview,
    });
    Ok(ToolOutput::structured(
        serde_json::to_string_pretty(&output)?,
        output,
    ))
}

/// `get-key-value-store-record` handler.
pub async fn get_key_value_record(
    state: &ServerState,
    frame: &ToolCallFrame,
) -> Result<ToolOutput> {
    let request: GetKeyValueRecordRequest =
        serde_json::from_value(Value::Object(frame.args.clone()))
            .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let record = state
        .apify()?
        .key_value_record(&request.store_id, &request.record_key)
        .await?;

    let output = json!({
        "storeId": request.store_id,
        "key": request.record_key,
        "record": record,
    });
    Ok(ToolOutput::structured(
        serde_json::to_string_pretty(&output)?,
        output,
    ))
}
