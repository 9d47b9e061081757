// src/tools/mod.rs
// Tool entries: the canonical records held by the registry.
//
// A tool is a tagged variant: internal (handler runs in-process), actor
// (handler starts an Apify run), or actor-mcp (handler forwards to a remote
// MCP server). Entries are immutable once inserted; mutation happens by
// replacement through the registry.

pub mod call_actor;
pub mod catalog;
pub mod docs;
pub mod dynamic;
pub mod registry;
pub mod runs;
pub mod storage;
pub mod store;

use crate::config::UiMode;
use crate::error::{Result, ServerError};
use crate::progress::ProgressTracker;
use rmcp::model::{JsonObject, Meta, Tool, ToolAnnotations, ToolExecution};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Maximum tool name length accepted by MCP clients.
pub const MAX_TOOL_NAME_LENGTH: usize = 64;

/// Token substituted for `/` when an Actor full name becomes a tool name.
pub const SLASH_TOKEN: &str = "-slash-";

/// Whether a tool supports long-running task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSupport {
    #[default]
    None,
    Optional,
    Required,
}

impl TaskSupport {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSupport::None => "none",
            TaskSupport::Optional => "optional",
            TaskSupport::Required => "required",
        }
    }

    fn to_rmcp(self) -> rmcp::model::TaskSupport {
        match self {
            TaskSupport::None => rmcp::model::TaskSupport::Forbidden,
            TaskSupport::Optional => rmcp::model::TaskSupport::Optional,
            TaskSupport::Required => rmcp::model::TaskSupport::Required,
        }
    }
}

/// Public description of a tool: everything a client may see. Handlers and
/// validators are never part of this projection.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub annotations: Option<ToolAnnotations>,
    /// `_meta` for UI hosts; `openai/*` keys are filtered out of the listing
    /// unless the session runs in openai mode.
    pub meta: Option<Map<String, Value>>,
    pub task_support: TaskSupport,
}

/// Variant-specific data.
#[derive(Debug, Clone)]
pub enum ToolKind {
    Internal,
    Actor {
        /// Full `owner/name` of the Actor this tool invokes.
        full_name: String,
        /// Optional memory ceiling for runs started by this tool, in MB.
        memory_mbytes: Option<u32>,
    },
    ActorMcp {
        /// Tool name on the origin server.
        origin_name: String,
        /// Hex prefix of SHA-256 of the server URL.
        server_id: String,
        server_url: String,
    },
}

/// A registered tool with its pre-compiled argument validator.
#[derive(Clone)]
pub struct ToolEntry {
    pub spec: ToolSpec,
    pub kind: ToolKind,
    validator: Arc<jsonschema::Validator>,
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.spec.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl ToolEntry {
    /// Build an entry, compiling the validator. Fails (so the caller can skip
    /// the tool with a warning) when the schema does not compile.
    pub fn new(spec: ToolSpec, kind: ToolKind) -> Result<Self> {
        if !is_valid_tool_name(&spec.name) {
            return Err(ServerError::InvalidInput(format!(
                "invalid tool name: {:?}",
                spec.name
            )));
        }
        let validator = crate::schema::compile(&spec.input_schema)?;
        Ok(Self {
            spec,
            kind,
            validator: Arc::new(validator),
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Validate call arguments against the pre-compiled schema.
    pub fn validate_args(&self, args: &Value) -> std::result::Result<(), Vec<String>> {
        crate::schema::validate(&self.validator, args)
    }

    /// Project into the wire-level tool description. `openai/*` metadata is
    /// stripped outside openai mode; when nothing remains, `_meta` is absent.
    pub fn to_rmcp_tool(&self, ui_mode: UiMode) -> Tool {
        let input_schema = as_json_object(&self.spec.input_schema);
        let output_schema = self.spec.output_schema.as_ref().map(as_json_object);

        let meta = self.spec.meta.as_ref().and_then(|meta| {
            let filtered: Map<String, Value> = meta
                .iter()
                .filter(|(key, _)| ui_mode == UiMode::Openai || !key.starts_with("openai/"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if filtered.is_empty() {
                None
            } else {
                let mut wire = Meta::default();
                wire.extend(Meta(filtered));
                Some(wire)
            }
        });

        Tool {
            name: self.spec.name.clone().into(),
            title: None,
            description: Some(self.spec.description.clone().into()),
            input_schema,
            output_schema,
            annotations: self.spec.annotations.clone(),
            icons: None,
            execution: Some(ToolExecution {
                task_support: Some(self.spec.task_support.to_rmcp()),
            }),
            meta,
        }
    }
}

fn as_json_object(value: &Value) -> Arc<JsonObject> {
    match value {
        Value::Object(map) => Arc::new(map.clone()),
        _ => Arc::new(JsonObject::new()),
    }
}

/// Tool names must fit MCP client constraints: bounded length, restricted
/// character set.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LENGTH
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Map an Actor full name to a valid tool name. The mapping is deterministic;
/// the original name is recovered from the entry's `full_name`, never by
/// decoding.
pub fn actor_tool_name(full_name: &str) -> String {
    let mut name = full_name
        .replace('/', SLASH_TOKEN)
        .replace('.', crate::schema::encode::DOT_TOKEN);
    name.truncate(MAX_TOOL_NAME_LENGTH);
    name
}

/// Everything a handler needs for one call, owned by the dispatcher for the
/// duration of that call.
pub struct ToolCallFrame {
    /// Arguments, already validated against the tool's schema.
    pub args: Map<String, Value>,
    pub session_id: String,
    pub progress: Option<Arc<ProgressTracker>>,
    /// Abort signal: fires on MCP request cancellation, task cancellation,
    /// and dispatcher timeout.
    pub cancel: CancellationToken,
    /// Present when the call runs as a long-running task.
    pub task_id: Option<String>,
    /// Ids of rented Actors the session is entitled to call.
    pub rented_actor_ids: Vec<String>,
}

impl ToolCallFrame {
    pub fn new(args: Map<String, Value>, session_id: impl Into<String>) -> Self {
        Self {
            args,
            session_id: session_id.into(),
            progress: None,
            cancel: CancellationToken::new(),
            task_id: None,
            rented_actor_ids: Vec::new(),
        }
    }

    /// Required string argument, as a soft failure when missing.
    pub fn required_str(&self, key: &str) -> Result<&str> {
        self.args
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ServerError::InvalidInput(format!("missing required field '{key}'")))
    }

    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(Value::as_u64)
    }
}

/// What a handler returns; the dispatcher converts this into the MCP result.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub text: String,
    pub structured: Option<Value>,
    pub is_error: bool,
    /// Set by tools that mutate the registry so the dispatcher emits a
    /// tools/list_changed notification.
    pub tools_changed: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Text plus machine-readable structured content.
    pub fn structured(text: impl Into<String>, value: Value) -> Self {
        Self {
            text: text.into(),
            structured: Some(value),
            ..Self::default()
        }
    }

    pub fn with_tools_changed(mut self) -> Self {
        self.tools_changed = true;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn minimal_spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: "test tool".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
            output_schema: None,
            annotations: None,
            meta: None,
            task_support: TaskSupport::None,
        }
    }

    #[test]
    fn test_tool_name_charset() {
        assert!(is_valid_tool_name("call-actor"));
        assert!(is_valid_tool_name("a1b2_c3-d4"));
        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name("has space"));
        assert!(!is_valid_tool_name("owner/name"));
        assert!(!is_valid_tool_name("dotted.name"));
        assert!(!is_valid_tool_name(&"x".repeat(65)));
    }

    #[test]
    fn test_actor_tool_name_mapping() {
        assert_eq!(
            actor_tool_name("apify/rag-web-browser"),
            "apify-slash-rag-web-browser"
        );
        assert_eq!(actor_tool_name("acme/v2.5-crawler"), "acme-slash-v2-dot-5-crawler");
        assert!(is_valid_tool_name(&actor_tool_name("apify/rag-web-browser")));

        let long = format!("owner/{}", "n".repeat(100));
        assert_eq!(actor_tool_name(&long).len(), MAX_TOOL_NAME_LENGTH);
    }

    #[test]
    fn test_entry_rejects_bad_name() {
        let err = ToolEntry::new(minimal_spec("bad.name"), ToolKind::Internal);
        assert!(err.is_err());
    }

    #[test]
    fn test_meta_filtering_by_mode() {
        let mut spec = minimal_spec("widget-tool");
        let mut meta = Map::new();
        meta.insert("openai/outputTemplate".to_string(), json!("ui://w.html"));
        meta.insert("vendor/other".to_string(), json!(1));
        spec.meta = Some(meta);
        let entry = ToolEntry::new(spec, ToolKind::Internal).unwrap();

        let default_tool = entry.to_rmcp_tool(UiMode::Default);
        let meta = default_tool.meta.expect("non-openai key survives");
        assert!(meta.contains_key("vendor/other"));
        assert!(!meta.contains_key("openai/outputTemplate"));

        let openai_tool = entry.to_rmcp_tool(UiMode::Openai);
        let meta = openai_tool.meta.expect("all keys survive in openai mode");
        assert!(meta.contains_key("openai/outputTemplate"));
        assert!(meta.contains_key("vendor/other"));
    }

    #[test]
    fn test_meta_absent_when_only_openai_keys() {
        let mut spec = minimal_spec("widget-tool");
        let mut meta = Map::new();
        meta.insert("openai/outputTemplate".to_string(), json!("ui://w.html"));
        spec.meta = Some(meta);
        let entry = ToolEntry::new(spec, ToolKind::Internal).unwrap();

        assert!(entry.to_rmcp_tool(UiMode::Default).meta.is_none());
    }

    #[test]
    fn test_validate_args() {
        let spec = ToolSpec {
            input_schema: json!({
                "type": "object",
                "properties": { "q": { "type": "string" } },
                "required": ["q"]
            }),
            ..minimal_spec("needs-q")
        };
        let entry = ToolEntry::new(spec, ToolKind::Internal).unwrap();
        assert!(entry.validate_args(&json!({ "q": "hi" })).is_ok());
        assert!(entry.validate_args(&json!({})).is_err());
    }
}
