// src/schema/editors.rs
// Editor-hint handling: fixed nested shapes and array item inference.
//
// Actor input schemas carry platform editor hints that imply structure the
// raw schema omits. The nested shapes below are fixed constants defined by
// the platform's input editors.

use serde_json::{Map, Value, json};

/// Nested shape implied by an editor hint, or None when the editor adds no
/// structure beyond what the schema already states.
pub fn editor_shape(editor: &str) -> Option<Value> {
    match editor {
        "proxy" => Some(json!({
            "type": "object",
            "properties": {
                "useApifyProxy": {
                    "type": "boolean",
                    "description": "Whether to route requests through the Apify proxy pool.",
                    "default": true
                },
                "apifyProxyGroups": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Proxy groups to use, e.g. RESIDENTIAL."
                },
                "apifyProxyCountry": {
                    "type": "string",
                    "description": "Two-letter country code for proxy exit nodes."
                }
            },
            "required": ["useApifyProxy"]
        })),
        "requestListSources" => Some(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to add to the request queue." }
                },
                "required": ["url"]
            }
        })),
        "pseudoUrls" => Some(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "purl": { "type": "string", "description": "Pseudo-URL matching pattern." }
                },
                "required": ["purl"]
            }
        })),
        "globs" => Some(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "glob": { "type": "string", "description": "Glob pattern to match URLs." }
                },
                "required": ["glob"]
            }
        })),
        "keyValue" => Some(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "value": { "type": "string" }
                },
                "required": ["key", "value"]
            }
        })),
        "resourcePicker" => Some(json!({
            "type": "array",
            "items": { "type": "string", "description": "Resource id." }
        })),
        _ => None,
    }
}

/// Default array item type implied by an editor when nothing else pins it.
pub fn editor_item_type(editor: &str) -> Option<&'static str> {
    match editor {
        "requestListSources" | "json" | "globs" => Some("object"),
        "stringList" | "select" => Some("string"),
        _ => None,
    }
}

/// JSON type name of a value, as used in `items.type`.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Apply the editor shape to a property in place. The shape replaces the
/// property's structural fields but keeps its own title/description/default.
pub fn apply_editor_shape(prop: &mut Map<String, Value>, editor: &str) {
    let Some(shape) = editor_shape(editor) else {
        return;
    };
    let Value::Object(shape) = shape else {
        return;
    };
    for (key, value) in shape {
        // Structure wins over whatever the raw schema had for these keys;
        // descriptive fields stay untouched.
        if matches!(key.as_str(), "type" | "properties" | "items" | "required") {
            prop.insert(key, value);
        }
    }
}

/// Infer a missing `items.type` for an array property.
///
/// Priority: explicit `items.type`, then the type of `prefill[0]`, then
/// `default[0]`, then the editor-derived default.
pub fn infer_array_item_type(prop: &mut Map<String, Value>, editor: Option<&str>) {
    if prop.get("type").and_then(Value::as_str) != Some("array") {
        return;
    }
    let has_item_type = prop
        .get("items")
        .and_then(Value::as_object)
        .is_some_and(|items| items.contains_key("type"));
    if has_item_type {
        return;
    }

    let from_values = ["prefill", "default"].iter().find_map(|key| {
        prop.get(*key)
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .map(json_type_name)
    });
    let inferred = from_values.or_else(|| editor.and_then(editor_item_type));

    if let Some(item_type) = inferred {
        let items = prop
            .entry("items")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(items) = items {
            items.insert("type".to_string(), Value::String(item_type.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_proxy_shape_exposes_use_apify_proxy() {
        let mut prop = as_map(json!({ "title": "Proxy", "type": "object" }));
        apply_editor_shape(&mut prop, "proxy");
        let use_proxy = prop["properties"]["useApifyProxy"].clone();
        assert_eq!(use_proxy["type"], "boolean");
        assert_eq!(prop["required"], json!(["useApifyProxy"]));
        // Descriptive fields survive
        assert_eq!(prop["title"], "Proxy");
    }

    #[test]
    fn test_request_list_sources_items() {
        let mut prop = as_map(json!({ "type": "array" }));
        apply_editor_shape(&mut prop, "requestListSources");
        assert_eq!(prop["items"]["properties"]["url"]["type"], "string");
    }

    #[test]
    fn test_infer_prefers_explicit_items_type() {
        let mut prop = as_map(json!({
            "type": "array",
            "items": { "type": "number" },
            "prefill": ["not-a-number"]
        }));
        infer_array_item_type(&mut prop, Some("stringList"));
        assert_eq!(prop["items"]["type"], "number");
    }

    #[test]
    fn test_infer_from_prefill_then_default() {
        let mut prop = as_map(json!({ "type": "array", "prefill": [{"a": 1}] }));
        infer_array_item_type(&mut prop, None);
        assert_eq!(prop["items"]["type"], "object");

        let mut prop = as_map(json!({ "type": "array", "default": ["x"] }));
        infer_array_item_type(&mut prop, None);
        assert_eq!(prop["items"]["type"], "string");
    }

    #[test]
    fn test_infer_from_editor_fallback() {
        let mut prop = as_map(json!({ "type": "array" }));
        infer_array_item_type(&mut prop, Some("stringList"));
        assert_eq!(prop["items"]["type"], "string");

        let mut prop = as_map(json!({ "type": "array" }));
        infer_array_item_type(&mut prop, Some("globs"));
        assert_eq!(prop["items"]["type"], "object");
    }

    #[test]
    fn test_infer_skips_non_arrays() {
        let mut prop = as_map(json!({ "type": "string" }));
        infer_array_item_type(&mut prop, Some("stringList"));
        assert!(!prop.contains_key("items"));
    }
}
