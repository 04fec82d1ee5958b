//! Key and type checks applied to each layer before merging.
//!
//! Every layer is partial, so required fields are not enforced here; serde
//! defaults fill them after the merge.

use crate::ConfigError;
use serde_json::{Map, Value};

const TOP_LEVEL_KEYS: &[&str] = &[
    "$schema",
    "providers",
    "rules",
    "planner",
    "executor",
    "validator",
    "fallback",
    "memory",
    "model",
];

#[derive(Clone, Copy)]
enum Kind {
    String,
    OptionalString,
    Bool,
    Unsigned,
    Number,
    StringArray,
    OneOf(&'static [&'static str]),
}

/// Allowed keys and their kinds for every section.
fn section_fields(section: &str) -> &'static [(&'static str, Kind)] {
    match section {
        "providers" => &[
            ("config_path", Kind::OptionalString),
            ("search_paths", Kind::StringArray),
            ("call_timeout_ms", Kind::Unsigned),
            ("connect_timeout_ms", Kind::Unsigned),
        ],
        "rules" => &[("path", Kind::OptionalString)],
        "planner" => &[
            ("model_assisted", Kind::Bool),
            ("max_steps", Kind::Unsigned),
        ],
        "executor" => &[("mode", Kind::OneOf(&["sequential", "parallel"]))],
        "validator" => &[
            ("confidence_threshold", Kind::Number),
            ("max_issues", Kind::Unsigned),
            ("min_response_length", Kind::Unsigned),
        ],
        "fallback" => &[("enabled", Kind::Bool), ("real_time_override", Kind::Bool)],
        "memory" => &[
            ("enabled", Kind::Bool),
            ("path", Kind::OptionalString),
            ("top_k", Kind::Unsigned),
        ],
        "model" => &[
            ("base_url", Kind::String),
            ("name", Kind::String),
            ("api_key_env", Kind::String),
            ("temperature", Kind::Number),
            ("max_tokens", Kind::Unsigned),
        ],
        _ => &[],
    }
}

/// Reject unknown keys and mistyped values in one layer.
pub(super) fn check_layer(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let root = as_object(value, layer, "")?;
    for (key, value) in root {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            return Err(invalid_field(layer, key, "unknown key"));
        }
        if key == "$schema" {
            check_kind(value, Kind::String, layer, key)?;
            continue;
        }
        let section = as_object(value, layer, key)?;
        let fields = section_fields(key);
        for (field, field_value) in section {
            let path = format!("{key}.{field}");
            let Some((_, kind)) = fields.iter().find(|(name, _)| name == field) else {
                return Err(invalid_field(layer, &path, "unknown key"));
            };
            check_kind(field_value, *kind, layer, &path)?;
        }
    }
    Ok(())
}

fn check_kind(value: &Value, kind: Kind, layer: &str, path: &str) -> Result<(), ConfigError> {
    let ok = match kind {
        Kind::String => value.is_string(),
        Kind::OptionalString => value.is_string() || value.is_null(),
        Kind::Bool => value.is_boolean(),
        Kind::Unsigned => value.is_u64(),
        Kind::Number => value.is_number(),
        Kind::StringArray => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        Kind::OneOf(options) => value.as_str().is_some_and(|text| options.contains(&text)),
    };
    if ok {
        return Ok(());
    }
    let expected = match kind {
        Kind::String => "expected string".to_string(),
        Kind::OptionalString => "expected string or null".to_string(),
        Kind::Bool => "expected bool".to_string(),
        Kind::Unsigned => "expected non-negative integer".to_string(),
        Kind::Number => "expected number".to_string(),
        Kind::StringArray => "expected array of strings".to_string(),
        Kind::OneOf(options) => format!("expected one of {}", options.join(", ")),
    };
    Err(invalid_field(layer, path, &expected))
}

fn as_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{path}"),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::check_layer;
    use serde_json::json;

    #[test]
    fn accepts_known_sections() {
        let layer = json!({
            "providers": { "call_timeout_ms": 1000, "search_paths": ["a.json"] },
            "executor": { "mode": "parallel" },
            "memory": { "path": null }
        });
        assert_eq!(check_layer(&layer, "test").is_ok(), true);
    }

    #[test]
    fn rejects_unknown_nested_key() {
        let err = check_layer(&json!({ "planner": { "depth": 3 } }), "test").unwrap_err();
        assert_eq!(err.to_string(), "invalid config at test:planner.depth: unknown key");
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = check_layer(&json!({ "executor": { "mode": "eager" } }), "test").unwrap_err();
        assert!(err.to_string().contains("executor.mode"));
    }
}
