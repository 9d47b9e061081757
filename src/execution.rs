// src/execution.rs
// Remote job execution: start an Actor run, race its completion against the
// abort signal, and post-process the result set into a bounded preview.

use crate::apify::{ApifyClient, MAX_RUN_MEMORY_MBYTES, MIN_RUN_MEMORY_MBYTES, RunStatus};
use crate::error::{Result, ServerError};
use crate::preview::{PREVIEW_CHAR_BUDGET, build_preview, infer_items_schema};
use crate::tools::{ToolCallFrame, ToolOutput};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Page size when fetching dataset items.
const DATASET_PAGE_SIZE: u64 = 250;

/// Hard cap on items fetched for a preview; the character budget usually
/// bites first.
const MAX_PREVIEW_ITEMS: usize = 1_000;

/// Result summary returned for a completed Actor run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRunSummary {
    pub run_id: String,
    pub dataset_id: String,
    pub item_count: usize,
    pub schema: Value,
    pub preview_items: Vec<Value>,
}

/// Clamp a requested memory limit into the platform's allowed range. With no
/// request the Actor's own default applies (None is passed through).
pub fn clamp_memory(requested: Option<u32>, ceiling: Option<u32>) -> Option<u32> {
    let capped = match (requested, ceiling) {
        (Some(req), Some(ceiling)) => Some(req.min(ceiling)),
        (Some(req), None) => Some(req),
        (None, ceiling) => ceiling,
    };
    capped.map(|m| m.clamp(MIN_RUN_MEMORY_MBYTES, MAX_RUN_MEMORY_MBYTES))
}

/// Execute an Actor with the given (validated, still dot-encoded) input and
/// return the run summary.
///
/// The frame's cancellation token is raced against run completion. On abort
/// the remote run is best-effort killed and no result is produced, matching
/// the MCP rule that cancelled requests get no response.
pub async fn run_actor(
    client: &ApifyClient,
    actor_full_name: &str,
    input: Map<String, Value>,
    memory_mbytes: Option<u32>,
    timeout_secs: Option<u32>,
    frame: &ToolCallFrame,
) -> Result<ActorRunSummary> {
    let input = Value::Object(crate::schema::decode_arguments(input));
    let run = client
        .start_run(actor_full_name, &input, memory_mbytes, timeout_secs)
        .await?;
    info!(actor = actor_full_name, run_id = %run.id, "Started Actor run");

    if let Some(tracker) = &frame.progress {
        tracker.start_run_updates(client.clone(), run.id.clone(), actor_full_name.to_string());
    }

    let finished = tokio::select! {
        finished = client.wait_for_finish(&run.id) => finished,
        _ = frame.cancel.cancelled() => {
            // Best-effort abort; a failing abort RPC must not mask the
            // cancellation itself.
            if let Err(e) = client.abort_run(&run.id, false).await {
                warn!(run_id = %run.id, error = %e, "Failed to abort Actor run");
            }
            if let Some(tracker) = &frame.progress {
                tracker.stop();
            }
            return Err(ServerError::Cancelled);
        }
    };

    if let Some(tracker) = &frame.progress {
        tracker.stop();
    }
    let finished = finished?;

    if finished.status != RunStatus::Succeeded {
        return Err(ServerError::Other(format!(
            "Actor run {} finished with status {}{}",
            finished.id,
            finished.status.as_str(),
            finished
                .status_message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        )));
    }

    let dataset_id = finished.default_dataset_id.clone().ok_or_else(|| {
        ServerError::Other(format!("run {} has no default dataset", finished.id))
    })?;

    let items = fetch_items(client, &dataset_id).await?;
    let item_count = items.len();

    // Storage views tell us which fields matter when the preview must shrink
    let important_fields = match client.get_default_build(&finished.act_id).await {
        Ok(build) => build
            .actor_definition
            .and_then(|def| def.storages)
            .and_then(|storages| storages.dataset)
            .map(|dataset| dataset.important_fields())
            .unwrap_or_default(),
        Err(e) => {
            warn!(actor = actor_full_name, error = %e, "Could not fetch default build");
            Vec::new()
        }
    };

    let schema = infer_items_schema(&items);
    let preview_items = build_preview(items, &important_fields, PREVIEW_CHAR_BUDGET);

    Ok(ActorRunSummary {
        run_id: finished.id,
        dataset_id,
        item_count,
        schema,
        preview_items,
    })
}

async fn fetch_items(client: &ApifyClient, dataset_id: &str) -> Result<Vec<Value>> {
    let mut items: Vec<Value> = Vec::new();
    loop {
        let page = client
            .dataset_items(dataset_id, items.len() as u64, DATASET_PAGE_SIZE)
            .await?;
        let page_len = page.len();
        items.extend(page);
        if page_len < DATASET_PAGE_SIZE as usize || items.len() >= MAX_PREVIEW_ITEMS {
            break;
        }
    }
    items.truncate(MAX_PREVIEW_ITEMS);
    Ok(items)
}

/// Arguments added out-of-band by the dispatcher or payment flow; they are
/// not part of any Actor's input.
const OUT_OF_BAND_ARGUMENTS: [&str; 3] = ["mcpSessionId", "rentedActorIds", "skyfire-pay-id"];

/// Handler for registered Actor tools: the argument object, minus the
/// out-of-band parameters, is the Actor input.
pub async fn execute_actor_tool(
    client: &ApifyClient,
    actor_full_name: &str,
    memory_ceiling: Option<u32>,
    frame: &ToolCallFrame,
) -> Result<ToolOutput> {
    let mut input = frame.args.clone();
    for key in OUT_OF_BAND_ARGUMENTS {
        input.remove(key);
    }
    let summary = run_actor(
        client,
        actor_full_name,
        input,
        clamp_memory(None, memory_ceiling),
        None,
        frame,
    )
    .await?;
    summary_output(summary)
}

/// Render a run summary into tool output.
pub fn summary_output(summary: ActorRunSummary) -> Result<ToolOutput> {
    let structured = serde_json::to_value(&summary)?;
    let text = serde_json::to_string_pretty(&structured)?;
    Ok(ToolOutput::structured(text, structured))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_memory_range() {
        assert_eq!(clamp_memory(Some(64), None), Some(MIN_RUN_MEMORY_MBYTES));
        assert_eq!(clamp_memory(Some(1_048_576), None), Some(MAX_RUN_MEMORY_MBYTES));
        assert_eq!(clamp_memory(Some(4096), None), Some(4096));
    }

    #[test]
    fn test_clamp_memory_respects_tool_ceiling() {
        assert_eq!(clamp_memory(Some(8192), Some(2048)), Some(2048));
        assert_eq!(clamp_memory(None, Some(2048)), Some(2048));
        // Ceiling itself is clamped into the platform range
        assert_eq!(clamp_memory(None, Some(64)), Some(MIN_RUN_MEMORY_MBYTES));
    }

    #[test]
    fn test_clamp_memory_defers_to_actor_default() {
        assert_eq!(clamp_memory(None, None), None);
    }
}
