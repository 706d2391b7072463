//! Injection-defence transform applied to every piece of request input
//!
//! Two rules, both idempotent:
//! - object keys starting with `$` are removed at any depth
//! - string leaves are HTML-escaped, leaving existing entities untouched

use serde_json::{Map, Value};

/// Prefix marking document-store query operators
pub const OPERATOR_PREFIX: char = '$';

const ENTITIES: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;"];

/// Escape `& < > " '`. An `&` that already starts one of the produced
/// entities is kept, so `escape_html(escape_html(s)) == escape_html(s)`.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for (idx, c) in input.char_indices() {
        match c {
            '&' => {
                let rest = &input[idx..];
                if ENTITIES.iter().any(|e| rest.starts_with(e)) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }

    out
}

/// True when a mapping key must be dropped
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_PREFIX)
}

/// Recursively strip operator keys and escape string leaves
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_html(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter(|(key, _)| !is_operator_key(key))
                .map(|(key, v)| (key, sanitize_value(v)))
                .collect();
            Value::Object(cleaned)
        }
        other => other,
    }
}
