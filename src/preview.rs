// src/preview.rs
// Size-bounded previews of run results, plus shallow schema inference over
// observed dataset items.

use serde_json::{Map, Value, json};

/// Character budget for the serialized preview item list.
pub const PREVIEW_CHAR_BUDGET: usize = 50_000;

/// Serialized length of a JSON value, in characters.
fn json_len(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

/// Serialized length of the whole item array.
fn total_len(items: &[Value]) -> usize {
    // Brackets plus comma separators plus the items themselves
    let separators = if items.is_empty() { 0 } else { items.len() - 1 };
    2 + separators + items.iter().map(json_len).sum::<usize>()
}

/// Build a preview of dataset items bounded by `budget` characters.
///
/// Under budget, items pass through unchanged. Over budget, each item is
/// first projected to the fields the Actor's storage views declare important;
/// if that is still too large, items are dropped from the tail and a sentinel
/// describing the truncation is appended. A single item over the budget by
/// itself is returned unchanged.
pub fn build_preview(items: Vec<Value>, important_fields: &[String], budget: usize) -> Vec<Value> {
    if total_len(&items) <= budget {
        return items;
    }

    let original_count = items.len();
    let mut projected: Vec<Value> = if important_fields.is_empty() {
        items
    } else {
        items
            .into_iter()
            .map(|item| project_item(item, important_fields))
            .collect()
    };

    if total_len(&projected) <= budget {
        return projected;
    }

    if projected.len() == 1 {
        // The lone item exceeds the budget alone; returning nothing would be
        // worse than returning it oversized.
        return projected;
    }

    let mut current = total_len(&projected);
    while projected.len() > 1 && current > budget {
        if let Some(dropped) = projected.pop() {
            // Item plus its separator
            current -= json_len(&dropped) + 1;
        }
    }

    let kept = projected.len();
    projected.push(json!({
        "truncationInfo": "Items were dropped to fit the preview size limit; \
                           fetch the dataset directly for the full results.",
        "originalItemCount": original_count,
        "itemCountAfterTruncation": kept,
    }));
    projected
}

/// Keep only the important fields of an object item; non-objects pass through.
fn project_item(item: Value, fields: &[String]) -> Value {
    match item {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| fields.iter().any(|f| f == key))
                .collect(),
        ),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema inference
// ─────────────────────────────────────────────────────────────────────────────

/// Infer a minimal JSON-schema-like description of the observed items.
///
/// Object fields are recursed into; arrays merge the structure of all their
/// elements; fields absent from some items are marked optional.
pub fn infer_items_schema(items: &[Value]) -> Value {
    let mut merged: Option<Value> = None;
    for item in items {
        let schema = infer_value(item);
        merged = Some(match merged {
            None => schema,
            Some(previous) => merge_schemas(previous, schema),
        });
    }
    merged.unwrap_or_else(|| json!({ "type": "object", "properties": {} }))
}

fn infer_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let properties: Map<String, Value> = map
                .iter()
                .map(|(key, value)| (key.clone(), infer_value(value)))
                .collect();
            json!({ "type": "object", "properties": properties })
        }
        Value::Array(elements) => {
            let mut items: Option<Value> = None;
            for element in elements {
                let schema = infer_value(element);
                items = Some(match items {
                    None => schema,
                    Some(previous) => merge_schemas(previous, schema),
                });
            }
            match items {
                Some(items) => json!({ "type": "array", "items": items }),
                None => json!({ "type": "array" }),
            }
        }
        other => json!({ "type": crate::schema::editors::json_type_name(other) }),
    }
}

/// Merge two inferred schemas for the same position.
fn merge_schemas(a: Value, b: Value) -> Value {
    let a_type = a.get("type").cloned();
    let b_type = b.get("type").cloned();

    match (a_type.as_ref(), b_type.as_ref()) {
        (Some(at), Some(bt)) if at == bt && at == "object" => merge_objects(a, b),
        (Some(at), Some(bt)) if at == bt && at == "array" => merge_arrays(a, b),
        (Some(at), Some(bt)) if at == bt => a,
        _ => {
            let types = union_types(a_type, b_type);
            let optional = a.get("optional").or_else(|| b.get("optional")).cloned();
            let mut merged = Map::new();
            merged.insert("type".to_string(), types);
            if let Some(optional) = optional {
                merged.insert("optional".to_string(), optional);
            }
            Value::Object(merged)
        }
    }
}

fn merge_objects(a: Value, b: Value) -> Value {
    let optional = a.get("optional").or_else(|| b.get("optional")).cloned();
    let mut a_props = match a.get("properties").cloned() {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let b_props = match b.get("properties").cloned() {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let mut merged = Map::new();
    for (key, b_schema) in b_props {
        match a_props.remove(&key) {
            Some(a_schema) => {
                merged.insert(key, merge_schemas(a_schema, b_schema));
            }
            None => {
                merged.insert(key, mark_optional(b_schema));
            }
        }
    }
    // Fields seen only on the first side are optional too
    for (key, a_schema) in a_props {
        merged.insert(key, mark_optional(a_schema));
    }

    let mut out = Map::new();
    out.insert("type".to_string(), Value::String("object".to_string()));
    out.insert("properties".to_string(), Value::Object(merged));
    if let Some(optional) = optional {
        out.insert("optional".to_string(), optional);
    }
    Value::Object(out)
}

fn merge_arrays(a: Value, b: Value) -> Value {
    let items = match (a.get("items").cloned(), b.get("items").cloned()) {
        (Some(ai), Some(bi)) => Some(merge_schemas(ai, bi)),
        (Some(items), None) | (None, Some(items)) => Some(items),
        (None, None) => None,
    };
    match items {
        Some(items) => json!({ "type": "array", "items": items }),
        None => json!({ "type": "array" }),
    }
}

fn mark_optional(mut schema: Value) -> Value {
    if let Value::Object(map) = &mut schema {
        map.insert("optional".to_string(), Value::Bool(true));
    }
    schema
}

fn union_types(a: Option<Value>, b: Option<Value>) -> Value {
    let mut names: Vec<String> = Vec::new();
    for side in [a, b].into_iter().flatten() {
        match side {
            Value::String(name) => {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            Value::Array(list) => {
                for name in list.into_iter().filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                }) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            _ => {}
        }
    }
    Value::Array(names.into_iter().map(Value::String).collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_item(i: usize, payload_len: usize) -> Value {
        json!({
            "id": i,
            "title": format!("item {i}"),
            "body": "x".repeat(payload_len),
        })
    }

    #[test]
    fn test_under_budget_passes_through() {
        let items: Vec<Value> = (0..5).map(|i| wide_item(i, 10)).collect();
        let preview = build_preview(items.clone(), &["id".into()], PREVIEW_CHAR_BUDGET);
        assert_eq!(preview, items);
    }

    #[test]
    fn test_projection_to_important_fields() {
        // 200 items, ~600 chars each: well over a 50k budget
        let items: Vec<Value> = (0..200).map(|i| wide_item(i, 600)).collect();
        let fields = vec!["id".to_string(), "title".to_string()];
        let preview = build_preview(items, &fields, PREVIEW_CHAR_BUDGET);

        // Projection alone fits, so no sentinel is appended
        assert!(total_len(&preview) <= PREVIEW_CHAR_BUDGET);
        assert_eq!(preview.len(), 200);
        assert!(preview.iter().all(|item| {
            let obj = item.as_object().unwrap();
            obj.contains_key("id") && obj.contains_key("title") && !obj.contains_key("body")
        }));
    }

    #[test]
    fn test_tail_drop_appends_sentinel() {
        // Projected items still exceed a tiny budget
        let items: Vec<Value> = (0..50).map(|i| wide_item(i, 600)).collect();
        let fields = vec!["id".to_string(), "title".to_string()];
        let budget = 500;
        let preview = build_preview(items, &fields, budget);

        let sentinel = preview.last().unwrap();
        assert_eq!(sentinel["originalItemCount"], 50);
        let kept = sentinel["itemCountAfterTruncation"].as_u64().unwrap() as usize;
        assert_eq!(preview.len(), kept + 1);
        assert!(kept >= 1);

        // The kept prefix (without the sentinel) respects the budget
        assert!(total_len(&preview[..kept]) <= budget);
    }

    #[test]
    fn test_single_oversized_item_returned_unchanged() {
        let item = wide_item(0, 60_000);
        let preview = build_preview(vec![item.clone()], &[], PREVIEW_CHAR_BUDGET);
        assert_eq!(preview, vec![item]);
    }

    #[test]
    fn test_single_oversized_item_after_projection() {
        let item = json!({ "id": 1, "body": "x".repeat(60_000) });
        let fields = vec!["id".to_string(), "body".to_string()];
        let preview = build_preview(vec![item.clone()], &fields, PREVIEW_CHAR_BUDGET);
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0]["id"], 1);
    }

    #[test]
    fn test_infer_schema_basic_types() {
        let items = vec![json!({ "id": 1, "name": "a", "ok": true })];
        let schema = infer_items_schema(&items);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["id"]["type"], "number");
        assert_eq!(schema["properties"]["name"]["type"], "string");
        assert_eq!(schema["properties"]["ok"]["type"], "boolean");
    }

    #[test]
    fn test_infer_schema_marks_optional_fields() {
        let items = vec![
            json!({ "id": 1, "extra": "only here" }),
            json!({ "id": 2 }),
        ];
        let schema = infer_items_schema(&items);
        assert_eq!(schema["properties"]["extra"]["optional"], true);
        assert!(schema["properties"]["id"].get("optional").is_none());
    }

    #[test]
    fn test_infer_schema_recurses_and_merges_arrays() {
        let items = vec![
            json!({ "meta": { "lang": "en" }, "tags": ["a"] }),
            json!({ "meta": { "lang": "de", "region": "EU" }, "tags": ["b", "c"] }),
        ];
        let schema = infer_items_schema(&items);
        assert_eq!(schema["properties"]["meta"]["type"], "object");
        assert_eq!(
            schema["properties"]["meta"]["properties"]["region"]["optional"],
            true
        );
        assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
    }

    #[test]
    fn test_infer_schema_conflicting_types_union() {
        let items = vec![json!({ "v": 1 }), json!({ "v": "one" })];
        let schema = infer_items_schema(&items);
        let types = schema["properties"]["v"]["type"].as_array().unwrap();
        assert!(types.contains(&json!("number")));
        assert!(types.contains(&json!("string")));
    }

    #[test]
    fn test_infer_schema_empty_items() {
        let schema = infer_items_schema(&[]);
        assert_eq!(schema["type"], "object");
    }
}
