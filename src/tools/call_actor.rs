// src/tools/call_actor.rs
// The call-actor tool: run any Actor by name.
//
// Unlike registered Actor tools (whose schema IS the Actor's input schema),
// call-actor validates the nested `input` against the target Actor's
// normalized schema at call time. Validation failures are soft: the response
// carries the schema so the client can correct the next attempt.

use crate::error::{Result, ServerError};
use crate::execution;
use crate::mcp::ServerState;
use crate::tools::catalog;
use crate::tools::{ToolCallFrame, ToolOutput};
use serde::Deserialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallActorRequest {
    #[schemars(description = "Actor to call, as owner/name or Actor id")]
    pub actor: String,
    #[schemars(description = "Input for the Actor run; must match the Actor's input schema. \
                              Use fetch-actor-details to obtain the schema.")]
    pub input: Option<Map<String, Value>>,
    #[schemars(description = "Run options")]
    pub call_options: Option<CallOptions>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallOptions {
    #[schemars(description = "Memory limit for the run, in megabytes")]
    pub memory_mbytes: Option<u32>,
    #[schemars(description = "Timeout for the run, in seconds")]
    pub timeout_secs: Option<u32>,
}

/// `call-actor` handler, shared by both mode variants.
pub async fn call_actor(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: CallActorRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let client = state.apify()?;
    let definition = catalog::actor_definition(client, &request.actor).await?;

    let input = request.input.unwrap_or_default();
    if let Err(violations) =
        crate::schema::validate(&definition.validator, &Value::Object(input.clone()))
    {
        // Soft failure: no run is started, and the schema travels with the
        // violations to ease correction.
        let structured = json!({
            "actor": definition.full_name,
            "validationErrors": violations,
            "inputSchema": definition.input_schema,
        });
        return Ok(ToolOutput {
            text: format!(
                "Input for Actor {} is invalid:\n- {}\n\nExpected input schema:\n{}",
                definition.full_name,
                violations.join("\n- "),
                serde_json::to_string_pretty(&definition.input_schema)?
            ),
            structured: Some(structured),
            is_error: true,
            tools_changed: false,
        });
    }

    let options = request.call_options.unwrap_or(CallOptions {
        memory_mbytes: None,
        timeout_secs: None,
    });
    let memory = execution::clamp_memory(options.memory_mbytes, definition.default_memory);

    let summary = execution::run_actor(
        client,
        &definition.full_name,
        input,
        memory,
        options.timeout_secs,
        frame,
    )
    .await?;
    execution::summary_output(summary)
}
