// src/tools/catalog.rs
// Mode-aware tool catalog: which internal tools exist, how selectors resolve
// into a concrete tool set, and how Actor tools are loaded.

use crate::apify::ApifyClient;
use crate::config::UiMode;
use crate::error::{Result, ServerError};
use crate::mcp::ServerState;
use crate::proxy;
use crate::schema;
use crate::tools::{
    TaskSupport, ToolEntry, ToolKind, ToolSpec, actor_tool_name, call_actor, docs, dynamic, runs,
    storage, store,
};
use rmcp::model::ToolAnnotations;
use serde_json::{Map, Value, json};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Actors loaded when nothing selects otherwise.
pub const DEFAULT_ACTORS: [&str; 1] = ["apify/rag-web-browser"];

/// Categories expanded when no selectors are given at all.
const DEFAULT_CATEGORIES: [&str; 2] = ["actors", "docs"];

/// Property added to payment-eligible tools in skyfire mode.
const SKYFIRE_PAY_ID_PROPERTY: &str = "skyfire-pay-id";

const SKYFIRE_INSTRUCTIONS: &str = "This tool charges the caller through Skyfire. \
Obtain a pay token first and pass it as `skyfire-pay-id`.";

// ─────────────────────────────────────────────────────────────────────────────
// Categories and mode variants
// ─────────────────────────────────────────────────────────────────────────────

/// Tools of a category, for the given mode. Unknown names yield None so the
/// selector is interpreted as an Actor id.
pub fn category_tools(category: &str, mode: UiMode) -> Option<&'static [&'static str]> {
    match category {
        "actors" => Some(&["store-search", "fetch-actor-details", "call-actor"]),
        "docs" => Some(&["search-apify-docs", "fetch-apify-docs"]),
        "runs" => Some(&["get-actor-run", "get-actor-run-list", "abort-actor-run"]),
        "storage" => Some(&[
            "get-actor-output",
            "get-dataset-items",
            "get-key-value-store-record",
        ]),
        "dev" => Some(&["get-actor-log"]),
        "experimental" => Some(&["add-actor", "remove-actor"]),
        "ui" => match mode {
            UiMode::Openai => Some(&["store-search-internal", "fetch-actor-details-internal"]),
            UiMode::Default => Some(&[]),
        },
        _ => None,
    }
}

/// Whether a name is a known internal tool in any mode.
pub fn is_internal_tool_name(name: &str) -> bool {
    ALL_INTERNAL_TOOLS.contains(&name)
}

const ALL_INTERNAL_TOOLS: [&str; 16] = [
    "store-search",
    "store-search-internal",
    "fetch-actor-details",
    "fetch-actor-details-internal",
    "call-actor",
    "search-apify-docs",
    "fetch-apify-docs",
    "get-actor-run",
    "get-actor-run-list",
    "abort-actor-run",
    "get-actor-log",
    "get-actor-output",
    "get-dataset-items",
    "get-key-value-store-record",
    "add-actor",
    "remove-actor",
];

/// Tools whose only existence is the openai widget variant.
const OPENAI_ONLY_TOOLS: [&str; 2] = ["store-search-internal", "fetch-actor-details-internal"];

/// Meta-tools that mutate the registry; selectable only when adding Actors
/// dynamically is enabled.
const DYNAMIC_TOOLS: [&str; 2] = ["add-actor", "remove-actor"];

fn variant_exists(name: &str, mode: UiMode) -> bool {
    if OPENAI_ONLY_TOOLS.contains(&name) {
        mode == UiMode::Openai
    } else {
        is_internal_tool_name(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selector resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Result of resolving the configured selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSelection {
    /// Internal tool names, in inclusion order.
    pub internal: Vec<String>,
    /// Actor ids to load as tools.
    pub actors: Vec<String>,
}

/// Resolve selector lists into the concrete tool set a session sees.
pub fn resolve_selectors(
    tools: Option<&[String]>,
    actors: Option<&[String]>,
    mode: UiMode,
    enable_adding_actors: bool,
) -> ToolSelection {
    // 1. Normalize: trim, drop empties. None stays None (defaults apply);
    //    an explicit empty list means "no tools".
    let normalized: Option<Vec<String>> = tools.map(|list| {
        list.iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });

    let mut internal: Vec<String> = Vec::new();
    let mut actor_selectors: Vec<String> = Vec::new();

    // 2. Partition selectors into categories, internal tools, and Actor ids
    match &normalized {
        None => {
            for category in DEFAULT_CATEGORIES {
                if let Some(tools) = category_tools(category, mode) {
                    internal.extend(tools.iter().map(|t| t.to_string()));
                }
            }
        }
        Some(selectors) => {
            for selector in selectors {
                if let Some(tools) = category_tools(selector, mode) {
                    // The registry meta-tools need their flag even when their
                    // category is selected explicitly
                    internal.extend(
                        tools
                            .iter()
                            .filter(|tool| {
                                enable_adding_actors || !DYNAMIC_TOOLS.contains(*tool)
                            })
                            .map(|t| t.to_string()),
                    );
                } else if is_internal_tool_name(selector) {
                    if DYNAMIC_TOOLS.contains(&selector.as_str()) && !enable_adding_actors {
                        continue;
                    }
                    // Known tool: use the current mode's variant, or drop
                    // silently when this mode has none.
                    if variant_exists(selector, mode) {
                        internal.push(selector.clone());
                    }
                } else {
                    actor_selectors.push(selector.clone());
                }
            }
        }
    }

    // 3. Decide the Actor set: the explicit field wins, then Actor selectors,
    //    then the default set (only when nothing was selected at all and
    //    adding Actors dynamically is off).
    let actor_list: Vec<String> = match actors {
        Some(list) => list
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => {
            if !actor_selectors.is_empty() {
                actor_selectors
            } else if normalized.is_none() && !enable_adding_actors {
                DEFAULT_ACTORS.iter().map(|a| a.to_string()).collect()
            } else {
                Vec::new()
            }
        }
    };

    // 5. openai mode always carries the ui category
    if mode == UiMode::Openai
        && let Some(ui_tools) = category_tools("ui", mode)
    {
        internal.extend(ui_tools.iter().map(|t| t.to_string()));
    }

    // 6. Auto-inject run monitoring when anything can start a run, right
    //    after call-actor when present
    if internal.iter().any(|t| t == "call-actor") || !actor_list.is_empty() {
        let injected = ["get-actor-run", "get-actor-output"];
        match internal.iter().position(|t| t == "call-actor") {
            Some(position) => {
                for (i, tool) in injected.iter().enumerate() {
                    internal.insert(position + 1 + i, tool.to_string());
                }
            }
            None => internal.extend(injected.iter().map(|t| t.to_string())),
        }
    }

    if enable_adding_actors {
        internal.extend(DYNAMIC_TOOLS.iter().map(|t| t.to_string()));
    }

    // 7. Deduplicate, first occurrence wins
    let mut seen = std::collections::HashSet::new();
    internal.retain(|name| seen.insert(name.clone()));
    let mut seen_actors = std::collections::HashSet::new();
    let actors = actor_list
        .into_iter()
        .filter(|name| seen_actors.insert(name.clone()))
        .collect();

    ToolSelection { internal, actors }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing order
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow order of the core tools: discovery, details, execution,
/// monitoring, output, then doc fetching.
const WORKFLOW_ORDER: [&str; 7] = [
    "store-search",
    "search-apify-docs",
    "fetch-actor-details",
    "call-actor",
    "get-actor-run",
    "get-actor-output",
    "fetch-apify-docs",
];

/// Sort entries for listing: workflow tools first in fixed order, remaining
/// internal tools in registry order, Actor tools last sorted by name.
pub fn sort_for_listing(entries: &mut [Arc<ToolEntry>]) {
    let rank = |entry: &Arc<ToolEntry>| -> (u8, usize, String) {
        match &entry.kind {
            ToolKind::Internal => match WORKFLOW_ORDER.iter().position(|n| *n == entry.name()) {
                Some(position) => (0, position, String::new()),
                None => (1, 0, String::new()),
            },
            ToolKind::Actor { .. } | ToolKind::ActorMcp { .. } => {
                (2, 0, entry.name().to_string())
            }
        }
    };
    entries.sort_by(|a, b| rank(a).cmp(&rank(b)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal tool construction
// ─────────────────────────────────────────────────────────────────────────────

/// JSON Schema of a request struct, with the schemars preamble dropped.
fn schema_of<T: schemars::JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(json!({}));
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

fn read_only() -> Option<ToolAnnotations> {
    Some(ToolAnnotations {
        title: None,
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(true),
    })
}

fn run_starting() -> Option<ToolAnnotations> {
    Some(ToolAnnotations {
        title: None,
        read_only_hint: Some(false),
        destructive_hint: Some(false),
        idempotent_hint: Some(false),
        open_world_hint: Some(true),
    })
}

fn widget_meta(widget: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert(
        "openai/outputTemplate".to_string(),
        json!(format!("ui://widget/{widget}.html")),
    );
    meta.insert("openai/widgetAccessible".to_string(), json!(true));
    meta
}

struct InternalToolDef {
    description: String,
    input_schema: Value,
    annotations: Option<ToolAnnotations>,
    meta: Option<Map<String, Value>>,
    task_support: TaskSupport,
}

/// Definition of an internal tool for one mode. Both variants of a
/// mode-sensitive tool share the same input schema; only descriptions,
/// metadata, and task support differ.
fn internal_tool_def(name: &str, mode: UiMode) -> Option<InternalToolDef> {
    let openai = mode == UiMode::Openai;
    let def = match name {
        "store-search" | "store-search-internal" => {
            if name.ends_with("-internal") && !openai {
                return None;
            }
            InternalToolDef {
                description: "Search the Apify Store for Actors by keyword. Use this first \
                              to discover Actors for a scraping or automation job."
                    .to_string(),
                input_schema: schema_of::<store::StoreSearchRequest>(),
                annotations: read_only(),
                meta: openai.then(|| widget_meta("store-search")),
                task_support: TaskSupport::None,
            }
        }
        "fetch-actor-details" | "fetch-actor-details-internal" => {
            if name.ends_with("-internal") && !openai {
                return None;
            }
            InternalToolDef {
                description: "Fetch an Actor's description, input schema and pricing. Call \
                              this before call-actor to learn the expected input."
                    .to_string(),
                input_schema: schema_of::<store::FetchActorDetailsRequest>(),
                annotations: read_only(),
                meta: openai.then(|| widget_meta("actor-details")),
                task_support: TaskSupport::None,
            }
        }
        "call-actor" => InternalToolDef {
            description: if openai {
                "Run an Apify Actor as a long-running task. Returns a task handle \
                 immediately; poll with tasks/get and fetch output with get-actor-output."
                    .to_string()
            } else {
                "Run an Apify Actor and wait for it to finish. Returns a bounded preview \
                 of the results plus the run and dataset ids."
                    .to_string()
            },
            input_schema: schema_of::<call_actor::CallActorRequest>(),
            annotations: run_starting(),
            meta: openai.then(|| widget_meta("actor-run")),
            task_support: if openai {
                TaskSupport::Required
            } else {
                TaskSupport::Optional
            },
        },
        "search-apify-docs" => InternalToolDef {
            description: "Search the Apify documentation.".to_string(),
            input_schema: schema_of::<docs::DocsSearchRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "fetch-apify-docs" => InternalToolDef {
            description: "Fetch a page from the Apify documentation by URL.".to_string(),
            input_schema: schema_of::<docs::DocsFetchRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "get-actor-run" => InternalToolDef {
            description: "Get the status and details of an Actor run.".to_string(),
            input_schema: schema_of::<runs::GetActorRunRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "get-actor-run-list" => InternalToolDef {
            description: "List your recent Actor runs, newest first.".to_string(),
            input_schema: schema_of::<runs::GetActorRunListRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "abort-actor-run" => InternalToolDef {
            description: "Abort a running Actor run.".to_string(),
            input_schema: schema_of::<runs::GetActorRunRequest>(),
            annotations: Some(ToolAnnotations {
                title: None,
                read_only_hint: Some(false),
                destructive_hint: Some(true),
                idempotent_hint: Some(true),
                open_world_hint: Some(true),
            }),
            meta: None,
            task_support: TaskSupport::None,
        },
        "get-actor-log" => InternalToolDef {
            description: "Fetch the log tail of an Actor run.".to_string(),
            input_schema: schema_of::<runs::GetActorRunRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "get-actor-output" => InternalToolDef {
            description: "Fetch a bounded preview of a run's output dataset, with an \
                          inferred item schema."
                .to_string(),
            input_schema: schema_of::<storage::GetActorOutputRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "get-dataset-items" => InternalToolDef {
            description: "Read items from a dataset by id, with paging.".to_string(),
            input_schema: schema_of::<storage::GetDatasetItemsRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "get-key-value-store-record" => InternalToolDef {
            description: "Read a record from a key-value store by id and key.".to_string(),
            input_schema: schema_of::<storage::GetKeyValueRecordRequest>(),
            annotations: read_only(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "add-actor" => InternalToolDef {
            description: "Add an Actor from the Apify Store as a callable tool for this \
                          session."
                .to_string(),
            input_schema: schema_of::<dynamic::AddActorRequest>(),
            annotations: run_starting(),
            meta: None,
            task_support: TaskSupport::None,
        },
        "remove-actor" => InternalToolDef {
            description: "Remove a dynamically added tool from this session.".to_string(),
            input_schema: schema_of::<dynamic::RemoveActorRequest>(),
            annotations: run_starting(),
            meta: None,
            task_support: TaskSupport::None,
        },
        _ => return None,
    };
    Some(def)
}

/// Build an internal tool entry for the given mode. Returns None when the
/// tool has no variant in this mode.
pub fn build_internal_tool(name: &str, mode: UiMode, skyfire: bool) -> Option<ToolEntry> {
    let def = internal_tool_def(name, mode)?;
    let mut spec = ToolSpec {
        name: name.to_string(),
        description: def.description,
        input_schema: def.input_schema,
        output_schema: None,
        annotations: def.annotations,
        meta: def.meta,
        task_support: def.task_support,
    };
    if skyfire && name == "call-actor" {
        apply_skyfire(&mut spec);
    }
    match ToolEntry::new(spec, ToolKind::Internal) {
        Ok(entry) => Some(entry),
        Err(e) => {
            // Internal schemas are generated; a failure here is a programming
            // error, but it still must not crash tool loading.
            warn!(tool = name, error = %e, "Skipping internal tool");
            None
        }
    }
}

/// Add the skyfire payment property and instructions to a payment-eligible
/// tool spec. The spec is a fresh clone owned by the caller; entries already
/// in the registry are never mutated in place.
fn apply_skyfire(spec: &mut ToolSpec) {
    if let Value::Object(root) = &mut spec.input_schema {
        let properties = root
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(properties) = properties {
            properties.insert(
                SKYFIRE_PAY_ID_PROPERTY.to_string(),
                json!({
                    "type": "string",
                    "description": "Skyfire pay token covering this call."
                }),
            );
        }
    }
    spec.description = format!("{SKYFIRE_INSTRUCTIONS}\n\n{}", spec.description);
}

/// Build the internal entries of a selection.
pub fn build_internal_tools(selection: &ToolSelection, mode: UiMode, skyfire: bool) -> Vec<ToolEntry> {
    selection
        .internal
        .iter()
        .filter_map(|name| build_internal_tool(name, mode, skyfire))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor definitions and loading
// ─────────────────────────────────────────────────────────────────────────────

/// A fetched-and-normalized Actor definition.
pub struct CachedDefinition {
    pub full_name: String,
    pub description: String,
    /// Normalized, validator-ready input schema (pre-skyfire).
    pub input_schema: Value,
    pub validator: Arc<jsonschema::Validator>,
    pub default_memory: Option<u32>,
    pub web_server_mcp_path: Option<String>,
}

/// Process-wide definition cache, keyed by the `ownerOrId` the caller used.
/// Monotonic insert, never invalidated: Actor definitions change rarely.
fn definition_cache() -> &'static moka::future::Cache<String, Arc<CachedDefinition>> {
    static CACHE: OnceLock<moka::future::Cache<String, Arc<CachedDefinition>>> = OnceLock::new();
    CACHE.get_or_init(|| moka::future::Cache::builder().max_capacity(1_000).build())
}

/// Fetch (or recall) an Actor's normalized definition.
pub async fn actor_definition(
    client: &ApifyClient,
    owner_or_id: &str,
) -> Result<Arc<CachedDefinition>> {
    if let Some(hit) = definition_cache().get(owner_or_id).await {
        return Ok(hit);
    }

    let actor = client.get_actor(owner_or_id).await?;
    let build = client.get_default_build(owner_or_id).await?;
    let raw_input = build
        .actor_definition
        .and_then(|definition| definition.input)
        .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));

    let full_name = actor.full_name();
    let (input_schema, validator) = schema::normalize_and_compile(&full_name, &raw_input)
        .ok_or_else(|| {
            ServerError::SchemaCompile(format!("input schema of {full_name} does not compile"))
        })?;

    let description = actor
        .description
        .clone()
        .or_else(|| actor.title.clone())
        .unwrap_or_else(|| format!("Apify Actor {full_name}"));

    let definition = Arc::new(CachedDefinition {
        full_name,
        description,
        input_schema,
        validator: Arc::new(validator),
        default_memory: actor
            .default_run_options
            .as_ref()
            .and_then(|o| o.memory_mbytes),
        web_server_mcp_path: actor.web_server_mcp_path.clone(),
    });
    definition_cache()
        .insert(owner_or_id.to_string(), definition.clone())
        .await;
    Ok(definition)
}

/// Build a registry entry for a plain Actor tool.
pub fn build_actor_entry(definition: &CachedDefinition, skyfire: bool) -> Option<ToolEntry> {
    let mut spec = ToolSpec {
        name: actor_tool_name(&definition.full_name),
        description: definition.description.clone(),
        input_schema: definition.input_schema.clone(),
        output_schema: None,
        annotations: run_starting(),
        meta: None,
        task_support: TaskSupport::Optional,
    };
    if skyfire {
        apply_skyfire(&mut spec);
    }
    match ToolEntry::new(
        spec,
        ToolKind::Actor {
            full_name: definition.full_name.clone(),
            memory_mbytes: definition.default_memory,
        },
    ) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(actor = %definition.full_name, error = %e, "Skipping Actor tool");
            None
        }
    }
}

/// Load tool entries for a list of Actors, concurrently. Failures are logged
/// and skipped; one bad Actor never blocks the rest.
pub async fn load_actor_entries(state: &ServerState, names: &[String]) -> Vec<ToolEntry> {
    let Some(client) = state.apify.as_ref() else {
        if !names.is_empty() {
            debug!("Skipping Actor tools: no API token configured");
        }
        return Vec::new();
    };

    let loads = names.iter().map(|name| load_one(state, client, name));
    futures::future::join_all(loads)
        .await
        .into_iter()
        .flatten()
        .collect()
}

async fn load_one(state: &ServerState, client: &ApifyClient, name: &str) -> Vec<ToolEntry> {
    let definition = match actor_definition(client, name).await {
        Ok(definition) => definition,
        Err(e) => {
            warn!(actor = name, error = %e, "Skipping Actor");
            return Vec::new();
        }
    };

    // An Actor that serves MCP is proxied tool-by-tool. Skyfire mode turns
    // the proxy off, and without auth remote MCP servers are skipped.
    if let Some(path) = &definition.web_server_mcp_path
        && !state.config.skyfire_mode
    {
        let Some(token) = client.token() else {
            debug!(actor = name, "Skipping remote MCP Actor: requires authentication");
            return Vec::new();
        };
        let url = proxy::resolve_server_url(&definition.full_name, path);
        return match proxy::load_remote_tools(&url, token).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(actor = name, url = %url, error = %e, "Skipping remote MCP Actor");
                Vec::new()
            }
        };
    }

    build_actor_entry(&definition, state.config.skyfire_mode)
        .map(|entry| vec![entry])
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selector_resolution_openai_scenario() {
        // tools=["actors","fetch-apify-docs"], actors undefined, openai mode
        let selection = resolve_selectors(
            Some(&strings(&["actors", "fetch-apify-docs"])),
            None,
            UiMode::Openai,
            false,
        );

        assert_eq!(
            selection.internal,
            vec![
                "store-search",
                "fetch-actor-details",
                "call-actor",
                "get-actor-run",
                "get-actor-output",
                "fetch-apify-docs",
                "store-search-internal",
                "fetch-actor-details-internal",
            ]
        );
        assert!(selection.actors.is_empty());
    }

    #[test]
    fn test_defaults_when_nothing_selected() {
        let selection = resolve_selectors(None, None, UiMode::Default, false);
        assert!(selection.internal.contains(&"store-search".to_string()));
        assert!(selection.internal.contains(&"call-actor".to_string()));
        assert!(selection.internal.contains(&"search-apify-docs".to_string()));
        assert_eq!(selection.actors, vec!["apify/rag-web-browser"]);
    }

    #[test]
    fn test_dynamic_tools_need_flag_even_when_selected() {
        // Selecting the category does not bypass the flag
        let selection = resolve_selectors(
            Some(&strings(&["experimental"])),
            Some(&[]),
            UiMode::Default,
            false,
        );
        assert!(selection.internal.is_empty());

        // Neither does naming the tools directly; they are dropped, not
        // misread as Actor ids
        let selection = resolve_selectors(
            Some(&strings(&["add-actor", "remove-actor"])),
            Some(&[]),
            UiMode::Default,
            false,
        );
        assert!(selection.internal.is_empty());
        assert!(selection.actors.is_empty());

        // With the flag on, the explicit selection works
        let selection = resolve_selectors(
            Some(&strings(&["experimental"])),
            Some(&[]),
            UiMode::Default,
            true,
        );
        assert_eq!(selection.internal, vec!["add-actor", "remove-actor"]);
    }

    #[test]
    fn test_no_default_actors_when_adding_enabled() {
        let selection = resolve_selectors(None, None, UiMode::Default, true);
        assert!(selection.actors.is_empty());
        assert!(selection.internal.contains(&"add-actor".to_string()));
        assert!(selection.internal.contains(&"remove-actor".to_string()));
    }

    #[test]
    fn test_explicit_empty_means_none() {
        let selection = resolve_selectors(Some(&[]), Some(&[]), UiMode::Default, false);
        assert!(selection.internal.is_empty());
        assert!(selection.actors.is_empty());

        // Whitespace-only entries count as empty too
        let selection =
            resolve_selectors(Some(&strings(&[" ", ""])), None, UiMode::Default, false);
        assert!(selection.internal.is_empty());
    }

    #[test]
    fn test_unknown_selector_is_an_actor() {
        let selection = resolve_selectors(
            Some(&strings(&["junglee/free-courses"])),
            None,
            UiMode::Default,
            false,
        );
        assert_eq!(selection.actors, vec!["junglee/free-courses"]);
        // Actor tools pull in monitoring
        assert!(selection.internal.contains(&"get-actor-run".to_string()));
        assert!(selection.internal.contains(&"get-actor-output".to_string()));
    }

    #[test]
    fn test_explicit_actors_field_wins() {
        let selection = resolve_selectors(
            Some(&strings(&["selector/actor"])),
            Some(&strings(&["explicit/actor"])),
            UiMode::Default,
            false,
        );
        assert_eq!(selection.actors, vec!["explicit/actor"]);
    }

    #[test]
    fn test_openai_only_variant_dropped_in_default_mode() {
        let selection = resolve_selectors(
            Some(&strings(&["store-search-internal", "store-search"])),
            Some(&[]),
            UiMode::Default,
            false,
        );
        assert_eq!(selection.internal, vec!["store-search"]);
    }

    #[test]
    fn test_dedup_first_wins() {
        let selection = resolve_selectors(
            Some(&strings(&["runs", "actors"])),
            Some(&[]),
            UiMode::Default,
            false,
        );
        // get-actor-run came with the runs category; injection does not move it
        let first = selection
            .internal
            .iter()
            .position(|t| t == "get-actor-run")
            .unwrap();
        let call = selection
            .internal
            .iter()
            .position(|t| t == "call-actor")
            .unwrap();
        assert!(first < call);
        let occurrences = selection
            .internal
            .iter()
            .filter(|t| *t == "get-actor-run")
            .count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_mode_variants_share_input_schema() {
        for name in ALL_INTERNAL_TOOLS {
            let default_variant = build_internal_tool(name, UiMode::Default, false);
            let openai_variant = build_internal_tool(name, UiMode::Openai, false);
            if let (Some(d), Some(o)) = (default_variant, openai_variant) {
                assert_eq!(
                    d.spec.input_schema, o.spec.input_schema,
                    "schema parity violated for {name}"
                );
            }
        }
    }

    #[test]
    fn test_call_actor_variants_differ_in_task_support() {
        let default_variant =
            build_internal_tool("call-actor", UiMode::Default, false).unwrap();
        let openai_variant = build_internal_tool("call-actor", UiMode::Openai, false).unwrap();
        assert_eq!(default_variant.spec.task_support, TaskSupport::Optional);
        assert_eq!(openai_variant.spec.task_support, TaskSupport::Required);
        assert!(openai_variant.spec.meta.is_some());
        assert!(default_variant.spec.meta.is_none());
    }

    #[test]
    fn test_every_internal_tool_builds() {
        for name in ALL_INTERNAL_TOOLS {
            let built = build_internal_tool(name, UiMode::Openai, false);
            assert!(built.is_some(), "{name} failed to build in openai mode");
        }
        // openai-only variants vanish in default mode
        for name in OPENAI_ONLY_TOOLS {
            assert!(build_internal_tool(name, UiMode::Default, false).is_none());
        }
    }

    #[test]
    fn test_skyfire_augments_call_actor() {
        let entry = build_internal_tool("call-actor", UiMode::Default, true).unwrap();
        let properties = entry.spec.input_schema["properties"].as_object().unwrap();
        assert!(properties.contains_key(SKYFIRE_PAY_ID_PROPERTY));
        assert!(entry.spec.description.starts_with(SKYFIRE_INSTRUCTIONS));

        // Other tools are untouched
        let entry = build_internal_tool("store-search", UiMode::Default, true).unwrap();
        let properties = entry.spec.input_schema["properties"].as_object().unwrap();
        assert!(!properties.contains_key(SKYFIRE_PAY_ID_PROPERTY));
    }

    #[test]
    fn test_listing_order() {
        let mut entries: Vec<Arc<ToolEntry>> = vec![
            Arc::new(
                build_actor_entry(
                    &CachedDefinition {
                        full_name: "zeta/scraper".to_string(),
                        description: "z".to_string(),
                        input_schema: json!({ "type": "object" }),
                        validator: Arc::new(
                            schema::compile(&json!({ "type": "object" })).unwrap(),
                        ),
                        default_memory: None,
                        web_server_mcp_path: None,
                    },
                    false,
                )
                .unwrap(),
            ),
            Arc::new(
                build_actor_entry(
                    &CachedDefinition {
                        full_name: "alpha/scraper".to_string(),
                        description: "a".to_string(),
                        input_schema: json!({ "type": "object" }),
                        validator: Arc::new(
                            schema::compile(&json!({ "type": "object" })).unwrap(),
                        ),
                        default_memory: None,
                        web_server_mcp_path: None,
                    },
                    false,
                )
                .unwrap(),
            ),
            Arc::new(build_internal_tool("fetch-apify-docs", UiMode::Default, false).unwrap()),
            Arc::new(build_internal_tool("get-actor-output", UiMode::Default, false).unwrap()),
            Arc::new(build_internal_tool("call-actor", UiMode::Default, false).unwrap()),
            Arc::new(build_internal_tool("get-actor-run", UiMode::Default, false).unwrap()),
            Arc::new(build_internal_tool("store-search", UiMode::Default, false).unwrap()),
            Arc::new(build_internal_tool("search-apify-docs", UiMode::Default, false).unwrap()),
            Arc::new(build_internal_tool("fetch-actor-details", UiMode::Default, false).unwrap()),
        ];

        sort_for_listing(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "store-search",
                "search-apify-docs",
                "fetch-actor-details",
                "call-actor",
                "get-actor-run",
                "get-actor-output",
                "fetch-apify-docs",
                "alpha-slash-scraper",
                "zeta-slash-scraper",
            ]
        );
    }
}
