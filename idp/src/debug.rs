//! Diagnostic panels shown under the interaction views.
//!
//! Renders whatever it is given, so never feed it secrets on a deployment
//! without access control in front of the views.

use std::collections::HashSet;

use askama::Template;
use serde_json::{Map, Value};

struct DebugEntry<'a> {
    key: &'a str,
    value: String,
    emphasize_value: bool,
}

#[derive(Template)]
#[template(
    source = "{% for entry in entries %}{% if !loop.first %}<br/>{% endif %}<strong>{{ entry.key }}</strong>: {% if entry.emphasize_value %}<strong>{{ entry.value }}</strong>{% else %}{{ entry.value }}{% endif %}{% endfor %}",
    ext = "html"
)]
struct DebugTemplate<'a> {
    entries: Vec<DebugEntry<'a>>,
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Readable form of a nested value: strings quoted, containers spelled out.
fn inspect(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Array(items) if items.is_empty() => "[]".to_owned(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(inspect).collect();
            format!("[ {} ]", items.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_owned(),
        Value::Object(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{key}: {}", inspect(value)))
                .collect();
            format!("{{ {} }}", fields.join(", "))
        }
        other => other.to_string(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => inspect(other),
    }
}

/// Renders `key: value` pairs separated by `<br/>`.
///
/// Empty values are left out. Keys are emphasized, and so is any value
/// that names a key of the same record.
pub fn render(record: &Map<String, Value>) -> Result<String, askama::Error> {
    let keys: HashSet<&str> = record.keys().map(String::as_str).collect();

    let entries = record
        .iter()
        .filter(|(_, value)| !is_empty(value))
        .map(|(key, value)| {
            let value = display(value);
            DebugEntry {
                key,
                emphasize_value: keys.contains(value.as_str()),
                value,
            }
        })
        .collect();

    DebugTemplate { entries }.render()
}

pub fn render_value(value: &impl serde::Serialize) -> Result<String, askama::Error> {
    match serde_json::to_value(value) {
        Ok(Value::Object(record)) => render(&record),
        Ok(other) => Ok(display(&other)),
        Err(err) => Err(askama::Error::Custom(Box::new(err))),
    }
}
