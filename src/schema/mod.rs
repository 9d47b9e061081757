// src/schema/mod.rs
// Actor input schema normalization and validator compilation.
//
// The pipeline converts heterogeneous Actor input schemas into a
// validator-ready canonical form. The step order is contractual: shortening
// must happen before enum prose is appended, and editor shapes must be built
// before UI-only fields are filtered away. Each step is idempotent on its
// own output, so running the full pipeline twice equals running it once.

pub mod editors;
pub mod encode;

use crate::error::{Result, ServerError};
use serde_json::{Map, Value};
use tracing::warn;

pub use encode::{decode_arguments, decode_key, encode_key};

/// Property description cap, in characters.
const DESCRIPTION_MAX_CHARS: usize = 1_000;

/// Cumulative character cap for enum lists kept in the schema.
const ENUM_MAX_CHARS: usize = 200;

/// How many enum values are spelled out in the description prose.
const ENUM_PROSE_MAX_VALUES: usize = 20;

/// Property keys kept after filtering; everything else is a UI-only hint.
const ALLOWED_PROPERTY_KEYS: [&str; 9] = [
    "title",
    "description",
    "enum",
    "type",
    "default",
    "prefill",
    "properties",
    "items",
    "required",
];

/// Marker prepended to required property descriptions. Some schema consumers
/// ignore the `required` array entirely.
pub const REQUIRED_MARKER: &str = "**REQUIRED**";

/// Normalize a raw Actor input schema into the canonical, validator-ready
/// form. `whitelist`, when present, prunes the property set of well-known
/// Actors down to the fields worth exposing to an LLM.
pub fn normalize_input_schema(raw: &Value, whitelist: Option<&[&str]>) -> Value {
    let mut root = match raw {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    // AJV-like validators cannot resolve external references.
    root.remove("$schema");
    root.remove("$ref");
    root.remove("schemaVersion");
    root.entry("type")
        .or_insert_with(|| Value::String("object".to_string()));

    if let Some(whitelist) = whitelist {
        apply_whitelist(&mut root, whitelist);
    }

    mark_required(&mut root);

    let required: Vec<String> = required_names(&root);
    if let Some(Value::Object(props)) = root.get_mut("properties") {
        for (_, prop) in props.iter_mut() {
            let Value::Object(prop) = prop else { continue };
            let editor = prop
                .get("editor")
                .and_then(Value::as_str)
                .map(String::from);
            if let Some(editor) = &editor {
                editors::apply_editor_shape(prop, editor);
            }
            editors::infer_array_item_type(prop, editor.as_deref());
            filter_property(prop);
            shorten_property(prop);
            describe_enum_and_examples(prop);
        }
        *props = encode_property_map(std::mem::take(props));
    }

    // Re-encode the required array to match the encoded property names.
    if !required.is_empty() {
        root.insert(
            "required".to_string(),
            Value::Array(
                required
                    .iter()
                    .map(|name| Value::String(encode_key(name)))
                    .collect(),
            ),
        );
    }

    Value::Object(root)
}

/// Compile a normalized schema into a fast validator. `additionalProperties`
/// stays permitted: the dispatcher may add out-of-band parameters such as a
/// payment id.
pub fn compile(schema: &Value) -> Result<jsonschema::Validator> {
    jsonschema::validator_for(schema).map_err(|e| ServerError::SchemaCompile(e.to_string()))
}

/// Validate arguments, returning every violation message.
pub fn validate(validator: &jsonschema::Validator, args: &Value) -> std::result::Result<(), Vec<String>> {
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Property whitelists for well-known Actors whose full schemas are too noisy
/// for tool consumers.
pub fn property_whitelist(actor_full_name: &str) -> Option<&'static [&'static str]> {
    match actor_full_name {
        "apify/google-search-scraper" => Some(&[
            "queries",
            "resultsPerPage",
            "maxPagesPerQuery",
            "languageCode",
            "countryCode",
        ]),
        "apify/instagram-scraper" => Some(&[
            "directUrls",
            "search",
            "searchType",
            "resultsType",
            "resultsLimit",
        ]),
        _ => None,
    }
}

fn required_names(root: &Map<String, Value>) -> Vec<String> {
    root.get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Drop properties outside the whitelist and shrink `required` accordingly.
/// Every other top-level field of the schema is kept as-is.
fn apply_whitelist(root: &mut Map<String, Value>, whitelist: &[&str]) {
    if let Some(Value::Object(props)) = root.get_mut("properties") {
        props.retain(|name, _| whitelist.contains(&name.as_str()));
    }
    if let Some(Value::Array(required)) = root.get_mut("required") {
        required.retain(|name| name.as_str().is_some_and(|n| whitelist.contains(&n)));
    }
}

/// Step 1: prepend the required marker to descriptions of required properties.
fn mark_required(root: &mut Map<String, Value>) {
    let required = required_names(root);
    let Some(Value::Object(props)) = root.get_mut("properties") else {
        return;
    };
    for name in required {
        let Some(Value::Object(prop)) = props.get_mut(&name) else {
            continue;
        };
        let description = prop
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if description.starts_with(REQUIRED_MARKER) {
            continue;
        }
        let marked = if description.is_empty() {
            REQUIRED_MARKER.to_string()
        } else {
            format!("{REQUIRED_MARKER} {description}")
        };
        prop.insert("description".to_string(), Value::String(marked));
    }
}

/// Step 4: drop UI-only fields from a property.
fn filter_property(prop: &mut Map<String, Value>) {
    prop.retain(|key, _| ALLOWED_PROPERTY_KEYS.contains(&key.as_str()));
}

/// Step 5: cap description length and prune oversized enum lists.
fn shorten_property(prop: &mut Map<String, Value>) {
    if let Some(Value::String(description)) = prop.get_mut("description") {
        // Prose appended by the enum/example step is exempt from the cap;
        // truncating it on a second pass would break pipeline idempotence.
        let already_described =
            description.contains("\nPossible values:") || description.contains("\nExample values:");
        if !already_described && description.len() > DESCRIPTION_MAX_CHARS {
            *description = crate::utils::truncate(description, DESCRIPTION_MAX_CHARS);
        }
    }

    if let Some(Value::Array(values)) = prop.get_mut("enum") {
        let mut budget = 0usize;
        let mut keep = 0usize;
        for value in values.iter() {
            let len = match value {
                Value::String(s) => s.len(),
                other => other.to_string().len(),
            };
            if budget + len > ENUM_MAX_CHARS {
                break;
            }
            budget += len;
            keep += 1;
        }
        // Keep at least one value so the enum stays meaningful.
        values.truncate(keep.max(1));
    }
}

/// Step 6: spell out enum values and example inputs in the description, and
/// set `examples` from the prefill (or default) coerced to an array.
fn describe_enum_and_examples(prop: &mut Map<String, Value>) {
    let mut appendix = String::new();

    if let Some(Value::Array(values)) = prop.get("enum") {
        let already = prop
            .get("description")
            .and_then(Value::as_str)
            .is_some_and(|d| d.contains("Possible values:"));
        if !already && !values.is_empty() {
            let listed: Vec<String> = values
                .iter()
                .take(ENUM_PROSE_MAX_VALUES)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            appendix.push_str(&format!("\nPossible values: {}", listed.join(",")));
        }
    }

    let example_source = prop.get("prefill").or_else(|| prop.get("default")).cloned();
    if let Some(example) = example_source {
        if !example.is_null() {
            let examples = match example {
                Value::Array(items) => items,
                single => vec![single],
            };
            let already = prop
                .get("description")
                .and_then(Value::as_str)
                .is_some_and(|d| d.contains("Example values:"));
            if !already {
                let rendered = serde_json::to_string(&examples).unwrap_or_default();
                appendix.push_str(&format!("\nExample values: {rendered}"));
            }
            prop.insert("examples".to_string(), Value::Array(examples));
        }
    }

    if !appendix.is_empty() {
        let description = prop
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        prop.insert(
            "description".to_string(),
            Value::String(format!("{description}{appendix}")),
        );
    }
}

/// Step 7: encode dots in property names.
fn encode_property_map(props: Map<String, Value>) -> Map<String, Value> {
    props
        .into_iter()
        .map(|(key, value)| (encode_key(&key), value))
        .collect()
}

/// Normalize and compile in one go, logging and returning None on compile
/// failure so a bad Actor schema never takes the process down.
pub fn normalize_and_compile(
    actor_full_name: &str,
    raw: &Value,
) -> Option<(Value, jsonschema::Validator)> {
    let whitelist = property_whitelist(actor_full_name);
    let normalized = normalize_input_schema(raw, whitelist);
    match compile(&normalized) {
        Ok(validator) => Some((normalized, validator)),
        Err(e) => {
            warn!(
                actor = actor_full_name,
                error = %e,
                "Skipping tool: input schema failed to compile"
            );
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "schemaVersion": 1,
            "title": "Input",
            "type": "object",
            "properties": {
                "startUrls": {
                    "title": "Start URLs",
                    "type": "array",
                    "editor": "requestListSources",
                    "description": "Pages to crawl.",
                    "prefill": [{ "url": "https://example.com" }],
                    "sectionCaption": "Basic"
                },
                "proxy.groups": {
                    "type": "array",
                    "editor": "stringList",
                    "description": "Proxy groups."
                },
                "mode": {
                    "type": "string",
                    "enum": ["fast", "slow", "adaptive"],
                    "default": "fast"
                }
            },
            "required": ["startUrls"]
        })
    }

    #[test]
    fn test_root_metadata_stripped() {
        let normalized = normalize_input_schema(&sample_schema(), None);
        assert!(normalized.get("$schema").is_none());
        assert!(normalized.get("schemaVersion").is_none());
        assert_eq!(normalized["type"], "object");
    }

    #[test]
    fn test_required_marker_prepended() {
        let normalized = normalize_input_schema(&sample_schema(), None);
        let description = normalized["properties"]["startUrls"]["description"]
            .as_str()
            .unwrap();
        assert!(description.starts_with(REQUIRED_MARKER));
    }

    #[test]
    fn test_editor_shape_and_ui_fields() {
        let normalized = normalize_input_schema(&sample_schema(), None);
        let start_urls = &normalized["properties"]["startUrls"];
        assert_eq!(start_urls["items"]["properties"]["url"]["type"], "string");
        assert!(start_urls.get("editor").is_none());
        assert!(start_urls.get("sectionCaption").is_none());
    }

    #[test]
    fn test_dot_keys_encoded_everywhere() {
        let normalized = normalize_input_schema(&sample_schema(), None);
        let props = normalized["properties"].as_object().unwrap();
        assert!(props.contains_key("proxy-dot-groups"));
        assert!(!props.keys().any(|k| k.contains('.')));
        // stringList fallback kicks in for the item type
        assert_eq!(props["proxy-dot-groups"]["items"]["type"], "string");
    }

    #[test]
    fn test_enum_prose_and_examples() {
        let normalized = normalize_input_schema(&sample_schema(), None);
        let mode = &normalized["properties"]["mode"];
        let description = mode["description"].as_str().unwrap();
        assert!(description.contains("Possible values: fast,slow,adaptive"));
        assert_eq!(mode["examples"], json!(["fast"]));

        let start_urls = &normalized["properties"]["startUrls"];
        assert_eq!(
            start_urls["examples"],
            json!([{ "url": "https://example.com" }])
        );
    }

    #[test]
    fn test_long_description_truncated() {
        let schema = json!({
            "type": "object",
            "properties": {
                "verbose": { "type": "string", "description": "x".repeat(5_000) }
            }
        });
        let normalized = normalize_input_schema(&schema, None);
        let description = normalized["properties"]["verbose"]["description"]
            .as_str()
            .unwrap();
        assert!(description.len() <= DESCRIPTION_MAX_CHARS + 3);
        assert!(description.ends_with("..."));
    }

    #[test]
    fn test_enum_list_pruned_to_char_cap() {
        let values: Vec<String> = (0..100).map(|i| format!("value-{i:03}")).collect();
        let schema = json!({
            "type": "object",
            "properties": { "pick": { "type": "string", "enum": values } }
        });
        let normalized = normalize_input_schema(&schema, None);
        let kept = normalized["properties"]["pick"]["enum"].as_array().unwrap();
        assert!(!kept.is_empty());
        let total: usize = kept.iter().map(|v| v.as_str().unwrap().len()).sum();
        assert!(total <= ENUM_MAX_CHARS);
        // Prefix is kept, not an arbitrary subset
        assert_eq!(kept[0], "value-000");
    }

    #[test]
    fn test_pipeline_idempotent() {
        let once = normalize_input_schema(&sample_schema(), None);
        let twice = normalize_input_schema(&once, None);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_whitelist_prunes_properties_and_required() {
        let schema = json!({
            "type": "object",
            "properties": {
                "queries": { "type": "string" },
                "debugLog": { "type": "boolean" }
            },
            "required": ["queries", "debugLog"]
        });
        let normalized = normalize_input_schema(&schema, Some(&["queries"]));
        let props = normalized["properties"].as_object().unwrap();
        assert!(props.contains_key("queries"));
        assert!(!props.contains_key("debugLog"));
        assert_eq!(normalized["required"], json!(["queries"]));
    }

    #[test]
    fn test_compiled_validator_reports_missing_required() {
        let (normalized, validator) =
            normalize_and_compile("someone/crawler", &sample_schema()).unwrap();
        assert_eq!(normalized["type"], "object");

        let result = validate(&validator, &json!({}));
        let errors = result.unwrap_err();
        assert!(errors.iter().any(|e| e.contains("startUrls")));

        // Out-of-band properties are allowed
        let ok = validate(
            &validator,
            &json!({ "startUrls": [{ "url": "https://a.com" }], "skyfire-pay-id": "x" }),
        );
        assert!(ok.is_ok());
    }
}
