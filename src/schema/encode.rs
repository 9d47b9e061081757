// src/schema/encode.rs
// Reversible encoding of dots in property names.
//
// Some MCP clients only accept [A-Za-z0-9_-] in schema property keys, while
// Actor input schemas may use dotted names. The encoder must be a fixed point
// on already-encoded keys, and the decoder must be applied to incoming
// arguments before they are forwarded to the Actor.

use serde_json::{Map, Value};

/// Token substituted for `.` in property keys.
pub const DOT_TOKEN: &str = "-dot-";

/// Encode a property key. Fixed point: the output contains no `.`.
pub fn encode_key(key: &str) -> String {
    key.replace('.', DOT_TOKEN)
}

/// Decode a property key back to its original dotted form.
pub fn decode_key(key: &str) -> String {
    key.replace(DOT_TOKEN, ".")
}

/// Decode the top-level keys of an argument object.
pub fn decode_arguments(args: Map<String, Value>) -> Map<String, Value> {
    args.into_iter().map(|(k, v)| (decode_key(&k), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip() {
        for key in ["proxy.groups", "a.b.c", "plain", "already-dashed_ok"] {
            assert_eq!(decode_key(&encode_key(key)), key);
            assert!(!encode_key(key).contains('.'));
        }
    }

    #[test]
    fn test_encode_is_fixed_point() {
        let once = encode_key("settings.depth");
        assert_eq!(encode_key(&once), once);
    }

    #[test]
    fn test_decode_arguments_top_level() {
        let args = json!({
            "proxy-dot-groups": ["RESIDENTIAL"],
            "nested": { "keep-dot-as-is": 1 }
        });
        let Value::Object(args) = args else {
            unreachable!()
        };
        let decoded = decode_arguments(args);
        assert!(decoded.contains_key("proxy.groups"));
        // Nested keys are left alone; only schema-level property names were encoded.
        assert!(decoded["nested"].as_object().is_some_and(|o| o.contains_key("keep-dot-as-is")));
    }
}
