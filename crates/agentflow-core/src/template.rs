//! Mustache-style template rendering.
//!
//! Only variable substitution is supported: `{{ name }}` or
//! `{{ object.field }}` / `{{ list.0 }}` for nested lookups.  Strings are
//! inserted as-is, other values as compact JSON, and missing or null
//! values render as the empty string.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").unwrap_or_else(|e| panic!("invalid placeholder regex: {e}"))
});

/// Render `template` against `variables`.
pub fn render(template: &str, variables: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            lookup(variables, &caps[1]).map(stringify).unwrap_or_default()
        })
        .into_owned()
}

fn lookup<'a>(variables: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    // Whole-key match first, so keys containing dots still resolve.
    if let Some(value) = variables.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = variables.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
