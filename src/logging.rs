//! Log-friendly rendering of request payloads.

use serde_json::{Map, Value};

/// Rendered payloads longer than this are replaced by a shallow summary.
pub const MAX_RENDERED_LEN: usize = 2048;

/// Render a JSON payload for a log line.
///
/// Small payloads are rendered in full. Larger ones are flattened to their
/// top-level scalar fields, dropping nested objects and arrays, and marked
/// with `"truncated": true`. Never fails.
#[must_use]
pub fn summarize(value: &Value) -> String {
    let full = value.to_string();
    if full.len() <= MAX_RENDERED_LEN {
        return full;
    }

    let Value::Object(fields) = value else {
        return format!("<{} bytes of JSON>", full.len());
    };

    let mut shallow: Map<String, Value> = fields
        .iter()
        .filter(|(_, v)| !v.is_object() && !v.is_array())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    shallow.insert("truncated".to_string(), Value::Bool(true));

    let rendered = Value::Object(shallow).to_string();
    if rendered.len() <= MAX_RENDERED_LEN {
        rendered
    } else {
        format!("<{} bytes of JSON, {} fields>", full.len(), fields.len())
    }
}
