// src/dispatch.rs
// Request dispatcher: resolve the tool, validate arguments, execute inline or
// as a long-running task, classify failures, emit telemetry.

use crate::error::{Result, ServerError, ToolStatus};
use crate::execution;
use crate::mcp::{ActorsMcpServer, ServerState};
use crate::progress::ProgressTracker;
use crate::proxy;
use crate::tasks::{TaskRecord, TaskStatus};
use crate::telemetry::TelemetryEvent;
use crate::tools::{ToolCallFrame, ToolEntry, ToolKind, ToolOutput, call_actor, docs, dynamic, runs, storage, store};
use rmcp::ErrorData;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ProgressNotificationParam, ProgressToken,
};
use rmcp::service::{Peer, RequestContext, RoleServer};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Grace period for a handler to unwind after its abort signal fires.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Out-of-band argument carrying the session id on stdio transports.
pub const SESSION_ID_ARGUMENT: &str = "mcpSessionId";

/// Out-of-band argument carrying ids of rented Actors the caller may use.
pub const RENTED_ACTORS_ARGUMENT: &str = "rentedActorIds";

fn rented_actor_ids(args: &Map<String, Value>) -> Vec<String> {
    args.get(RENTED_ACTORS_ARGUMENT)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Handle one `tools/call`.
pub async fn dispatch_call(
    server: &ActorsMcpServer,
    request: CallToolRequestParams,
    context: RequestContext<RoleServer>,
) -> std::result::Result<CallToolResult, ErrorData> {
    let started = Instant::now();
    let tool_name = request.name.to_string();
    let args = request.arguments.clone().unwrap_or_default();
    let session_id = session_id_from(&args, &server.session_id);

    // Resolve the tool; an unknown name is a user error, not a protocol one
    let Some(entry) = server.state.registry.get(&tool_name).await else {
        let available = server.state.registry.names().await;
        emit_telemetry(server, &tool_name, &session_id, ToolStatus::SoftFail, started).await;
        return Ok(soft_fail(
            format!(
                "Tool '{}' is not available. Available tools: {}. \
                 Use store-search to discover Actors.",
                tool_name,
                available.join(", ")
            ),
            Some(json!({ "availableTools": available })),
        ));
    };

    // Validate against the pre-compiled schema
    if let Err(violations) = entry.validate_args(&Value::Object(args.clone())) {
        emit_telemetry(server, &tool_name, &session_id, ToolStatus::SoftFail, started).await;
        return Ok(soft_fail(
            format!(
                "Arguments for '{}' failed validation:\n- {}\n\nExpected input schema:\n{}",
                tool_name,
                violations.join("\n- "),
                serde_json::to_string_pretty(&entry.spec.input_schema).unwrap_or_default()
            ),
            Some(json!({
                "validationErrors": violations,
                "inputSchema": entry.spec.input_schema,
            })),
        ));
    }

    // Tools that require task semantics are auto-enqueued even when the
    // client used a plain call.
    if entry.spec.task_support == crate::tools::TaskSupport::Required && request.task.is_none() {
        let progress = context
            .meta
            .get_progress_token()
            .map(|token| (token, context.peer.clone()));
        let record =
            enqueue_tool_task(server, entry.clone(), args, &session_id, progress).await?;
        return Ok(task_started_result(&record));
    }

    // Inline execution
    let frame_cancel = context.ct.child_token();
    let (tracker, forwarder) = spawn_progress_forwarder(
        context.meta.get_progress_token(),
        context.peer.clone(),
        None,
    );
    let rented = rented_actor_ids(&args);
    let frame = ToolCallFrame {
        args,
        session_id: session_id.clone(),
        progress: tracker,
        cancel: frame_cancel,
        task_id: None,
        rented_actor_ids: rented,
    };

    let result = {
        let run = run_tool(&server.state, &entry, &frame);
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(server.state.config.tool_timeout) => {
                // Timeout rides the same abort signal as cancellation
                frame.cancel.cancel();
                match tokio::time::timeout(ABORT_GRACE, &mut run).await {
                    Ok(result) => result,
                    Err(_) => Err(ServerError::Cancelled),
                }
            }
        }
    };

    if let Some(tracker) = &frame.progress {
        tracker.stop();
    }
    let tools_changed = matches!(&result, Ok(out) if out.tools_changed);
    let status = status_of(&result);
    let response = finish_call(&tool_name, result);

    drop(frame);
    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }
    if tools_changed {
        let _ = context.peer.notify_tool_list_changed().await;
    }
    if status != ToolStatus::Succeeded {
        server
            .log_to_client(
                &context.peer,
                rmcp::model::LoggingLevel::Warning,
                json!({ "tool": tool_name, "status": status.as_str() }),
            )
            .await;
    }
    emit_telemetry(server, &tool_name, &session_id, status, started).await;

    // A cancelled request gets no reply. Cancelling the request token last,
    // after the abort RPC, tracker stop, and telemetry have all run, makes
    // the service layer drop whatever `finish_call` produced instead of
    // serializing it.
    if status == ToolStatus::Aborted {
        context.ct.cancel();
    }
    response
}

/// Session id: the out-of-band argument wins (stdio injection), otherwise the
/// transport-provided identity of this server instance.
fn session_id_from(args: &Map<String, Value>, fallback: &str) -> String {
    args.get(SESSION_ID_ARGUMENT)
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| fallback.to_string())
}

fn status_of(result: &Result<ToolOutput>) -> ToolStatus {
    match result {
        Ok(out) if out.is_error => ToolStatus::SoftFail,
        Ok(_) => ToolStatus::Succeeded,
        Err(e) => e.tool_status(),
    }
}

/// Convert the handler outcome into the wire response. An aborted call never
/// becomes a result payload: the dispatcher cancels the request token, so
/// the error below is discarded by the service layer, never serialized.
fn finish_call(
    tool_name: &str,
    result: Result<ToolOutput>,
) -> std::result::Result<CallToolResult, ErrorData> {
    match result {
        Ok(out) => Ok(output_result(out)),
        Err(ServerError::UnknownToolType(name)) => Err(ErrorData::invalid_params(
            format!("unknown tool type for '{name}'"),
            None,
        )),
        Err(ServerError::Cancelled) => Err(ErrorData::internal_error(
            "tool call aborted".to_string(),
            None,
        )),
        Err(e) => Ok(error_result(tool_name, &e)),
    }
}

fn output_result(out: ToolOutput) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(out.text)],
        structured_content: out.structured,
        is_error: Some(out.is_error),
        meta: None,
    }
}

fn soft_fail(text: String, structured: Option<Value>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: structured,
        is_error: Some(true),
        meta: None,
    }
}

/// Render a classified error as content. Failures point at the recovery
/// tools so the client can correct course.
fn error_result(tool_name: &str, error: &ServerError) -> CallToolResult {
    soft_fail(
        format!(
            "Tool '{}' failed: {}\n\nUse store-search to find Actors or \
             fetch-actor-details to check the expected input.",
            tool_name, error
        ),
        Some(json!({ "tool": tool_name, "error": error.to_string() })),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool execution
// ─────────────────────────────────────────────────────────────────────────────

/// Run a tool by kind. Internal tools dispatch by name; Actor tools start a
/// run; remote-MCP tools forward to their origin server.
pub async fn run_tool(
    state: &Arc<ServerState>,
    entry: &ToolEntry,
    frame: &ToolCallFrame,
) -> Result<ToolOutput> {
    match &entry.kind {
        ToolKind::Internal => run_internal(entry.name(), state, frame).await,
        ToolKind::Actor {
            full_name,
            memory_mbytes,
        } => execution::execute_actor_tool(state.apify()?, full_name, *memory_mbytes, frame).await,
        ToolKind::ActorMcp {
            origin_name,
            server_url,
            ..
        } => {
            let token = state
                .apify
                .as_ref()
                .and_then(|client| client.token())
                .ok_or_else(|| {
                    ServerError::Unauthorized(
                        "remote MCP tools require an APIFY_TOKEN".to_string(),
                    )
                })?;
            proxy::call_remote_tool(server_url, origin_name, token, frame.args.clone()).await
        }
    }
}

async fn run_internal(
    name: &str,
    state: &Arc<ServerState>,
    frame: &ToolCallFrame,
) -> Result<ToolOutput> {
    match name {
        "store-search" | "store-search-internal" => store::store_search(state, frame).await,
        "fetch-actor-details" | "fetch-actor-details-internal" => {
            store::fetch_actor_details(state, frame).await
        }
        "call-actor" => call_actor::call_actor(state, frame).await,
        "search-apify-docs" => docs::search_apify_docs(state, frame).await,
        "fetch-apify-docs" => docs::fetch_apify_docs(state, frame).await,
        "get-actor-run" => runs::get_actor_run(state, frame).await,
        "get-actor-run-list" => runs::get_actor_run_list(state, frame).await,
        "abort-actor-run" => runs::abort_actor_run(state, frame).await,
        "get-actor-log" => runs::get_actor_log(state, frame).await,
        "get-actor-output" => storage::get_actor_output(state, frame).await,
        "get-dataset-items" => storage::get_dataset_items(state, frame).await,
        "get-key-value-store-record" => storage::get_key_value_record(state, frame).await,
        "add-actor" => dynamic::add_actor(state, frame).await,
        "remove-actor" => dynamic::remove_actor(state, frame).await,
        other => Err(ServerError::UnknownToolType(other.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Long-running tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Create the task record and schedule execution. The record exists (and its
/// id is returned) before execution starts; scheduling is deferred, never
/// synchronous in the call handler.
pub async fn enqueue_tool_task(
    server: &ActorsMcpServer,
    entry: Arc<ToolEntry>,
    args: Map<String, Value>,
    session_id: &str,
    progress: Option<(ProgressToken, Peer<RoleServer>)>,
) -> std::result::Result<TaskRecord, ErrorData> {
    let record = server
        .state
        .task_store
        .create_task(
            session_id,
            entry.name(),
            Value::Object(args.clone()),
            None,
        )
        .await
        .map_err(|e| ErrorData::internal_error(format!("failed to create task: {e}"), None))?;

    let server = server.clone();
    let spawned_record = record.clone();
    tokio::spawn(async move {
        execute_task(server, entry, args, spawned_record, progress).await;
    });

    debug!(task_id = %record.task_id, tool = %record.tool_name, "Enqueued task");
    Ok(record)
}

/// Immediate response for an auto-enqueued call.
pub fn task_started_result(record: &TaskRecord) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(format!(
            "Task {} started ({} running asynchronously). \
             Poll with tasks/get, fetch the payload with tasks/result.",
            record.task_id, record.tool_name
        ))],
        structured_content: Some(json!({
            "taskId": record.task_id,
            "status": record.status.as_str(),
            "createdAt": record.created_at,
        })),
        is_error: Some(false),
        meta: None,
    }
}

/// Run a task to a terminal state, honoring the cancellation races: the
/// status is read before the `working` transition and again before any
/// result write, and `cancelled` is a hard stop at both points.
async fn execute_task(
    server: ActorsMcpServer,
    entry: Arc<ToolEntry>,
    args: Map<String, Value>,
    record: TaskRecord,
    progress: Option<(ProgressToken, Peer<RoleServer>)>,
) {
    let started = Instant::now();
    let store = server.state.task_store.clone();
    let task_id = record.task_id.clone();
    let session_id = record.session_id.clone();

    // Cancellation may have won the race before execution began
    if store.is_cancelled(&task_id, &session_id).await.unwrap_or(false) {
        debug!(task_id = %task_id, "Task cancelled before start");
        return;
    }
    if let Err(e) = store
        .update_task_status(&task_id, TaskStatus::Working, None, &session_id)
        .await
    {
        debug!(task_id = %task_id, error = %e, "Could not start task");
        return;
    }

    let cancel = server.register_running_task(&task_id).await;
    let (tracker, forwarder) = match progress {
        Some((token, peer)) => {
            let (tracker, rx) = ProgressTracker::new(token.clone(), Some(task_id.clone()));
            (Some(tracker), Some(forward_updates(token, peer, rx)))
        }
        None => (None, None),
    };
    let rented = rented_actor_ids(&args);
    let frame = ToolCallFrame {
        args,
        session_id: session_id.clone(),
        progress: tracker,
        cancel,
        task_id: Some(task_id.clone()),
        rented_actor_ids: rented,
    };

    let result = run_tool(&server.state, &entry, &frame).await;

    if let Some(tracker) = &frame.progress {
        tracker.stop();
    }
    server.unregister_running_task(&task_id).await;

    let status = status_of(&result);
    let cancelled = store.is_cancelled(&task_id, &session_id).await.unwrap_or(false);
    if cancelled || status == ToolStatus::Aborted {
        // The record is already terminal (cancelled); write nothing
        debug!(task_id = %task_id, "Task cancelled; discarding result");
    } else {
        let (terminal, payload) = match result {
            Ok(out) => (TaskStatus::Completed, output_payload(&out)),
            Err(e) => (
                TaskStatus::Failed,
                json!({ "error": e.to_string(), "status": e.tool_status().as_str() }),
            ),
        };
        if let Err(e) = store
            .store_task_result(&task_id, terminal, payload, &session_id)
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to store task result");
        }
    }

    drop(frame);
    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }
    emit_telemetry(&server, entry.name(), &session_id, status, started).await;
}

/// Serialize tool output the way a call response would look, so the task
/// payload is interchangeable with a synchronous result.
fn output_payload(out: &ToolOutput) -> Value {
    json!({
        "content": [{ "type": "text", "text": out.text }],
        "structuredContent": out.structured,
        "isError": out.is_error,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress forwarding
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_progress_forwarder(
    token: Option<ProgressToken>,
    peer: Peer<RoleServer>,
    task_id: Option<String>,
) -> (Option<Arc<ProgressTracker>>, Option<JoinHandle<()>>) {
    match token {
        Some(token) => {
            let (tracker, rx) = ProgressTracker::new(token.clone(), task_id);
            let forwarder = forward_updates(token, peer, rx);
            (Some(tracker), Some(forwarder))
        }
        None => (None, None),
    }
}

/// Forward tracker updates to the peer. Exits naturally once every sender is
/// dropped, after draining queued notifications.
fn forward_updates(
    token: ProgressToken,
    peer: Peer<RoleServer>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<crate::progress::ProgressUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let _ = peer
                .notify_progress(ProgressNotificationParam {
                    progress_token: token.clone(),
                    progress: update.progress,
                    total: None,
                    message: update.message,
                })
                .await;
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────────────────

async fn emit_telemetry(
    server: &ActorsMcpServer,
    tool_name: &str,
    session_id: &str,
    status: ToolStatus,
    started: Instant,
) {
    let Some(telemetry) = &server.state.telemetry else {
        return;
    };
    let (client_name, client_version, protocol_version) = server.client_info().await;
    telemetry.emit(TelemetryEvent {
        tool_name: tool_name.to_string(),
        session_id: session_id.to_string(),
        transport: server.state.config.transport.as_str(),
        protocol_version,
        client_name,
        client_version,
        duration_ms: started.elapsed().as_millis() as u64,
        status: status.as_str(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_prefers_injected_argument() {
        let mut args = Map::new();
        args.insert(SESSION_ID_ARGUMENT.to_string(), json!("injected"));
        assert_eq!(session_id_from(&args, "fallback"), "injected");
        assert_eq!(session_id_from(&Map::new(), "fallback"), "fallback");
    }

    #[test]
    fn test_status_of_classification() {
        assert_eq!(
            status_of(&Ok(ToolOutput::text("ok"))),
            ToolStatus::Succeeded
        );
        let soft = ToolOutput {
            is_error: true,
            ..ToolOutput::text("bad input")
        };
        assert_eq!(status_of(&Ok(soft)), ToolStatus::SoftFail);
        assert_eq!(
            status_of(&Err(ServerError::Cancelled)),
            ToolStatus::Aborted
        );
        assert_eq!(
            status_of(&Err(ServerError::Other("boom".into()))),
            ToolStatus::Failed
        );
    }

    #[test]
    fn test_finish_call_aborted_never_yields_a_payload() {
        let response = finish_call("call-actor", Err(ServerError::Cancelled));
        assert!(response.is_err());
    }

    #[test]
    fn test_finish_call_unknown_tool_type_is_protocol_error() {
        let response = finish_call(
            "mystery",
            Err(ServerError::UnknownToolType("mystery".into())),
        );
        assert!(response.is_err());
    }

    #[test]
    fn test_error_result_mentions_recovery_tools() {
        let result = error_result("call-actor", &ServerError::NotFound("no such actor".into()));
        let text = result.content[0].as_text().map(|t| t.text.clone()).unwrap_or_default();
        assert!(text.contains("store-search"));
        assert!(text.contains("fetch-actor-details"));
        assert_eq!(result.is_error, Some(true));
    }
}
