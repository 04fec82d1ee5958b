//! Operation descriptors and their parameter schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON type of a declared operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Missing or unrecognised `type`.
    Any,
}

impl ParameterKind {
    fn from_schema_type(value: Option<&Value>) -> Self {
        let name = match value {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null"),
            _ => None,
        };
        match name {
            Some("string") => ParameterKind::String,
            Some("number") => ParameterKind::Number,
            Some("integer") => ParameterKind::Integer,
            Some("boolean") => ParameterKind::Boolean,
            Some("array") => ParameterKind::Array,
            Some("object") => ParameterKind::Object,
            _ => ParameterKind::Any,
        }
    }

    /// Whether a JSON value is acceptable for this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParameterKind::String => value.is_string(),
            ParameterKind::Number => value.is_number(),
            ParameterKind::Integer => value.is_i64() || value.is_u64(),
            ParameterKind::Boolean => value.is_boolean(),
            ParameterKind::Array => value.is_array(),
            ParameterKind::Object => value.is_object(),
            ParameterKind::Any => true,
        }
    }
}

/// A single named parameter of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub description: String,
    pub required: bool,
    /// Schema-declared default, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values when the schema declares an `enum`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,
}

/// Parsed input schema of an operation.
///
/// The raw JSON schema is retained so it can be shown to the model verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSchema {
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub raw: Value,
}

impl InputSchema {
    /// Parse a JSON-schema object (`{type: object, properties, required}`).
    ///
    /// Anything that is not an object schema yields an empty parameter list.
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let mut parameters = Vec::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                parameters.push(ParameterSpec {
                    name: name.clone(),
                    kind: ParameterKind::from_schema_type(property.get("type")),
                    description: property
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    required: required.contains(&name.as_str()),
                    default: property.get("default").cloned(),
                    allowed: property
                        .get("enum")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                });
            }
        }
        Self {
            parameters,
            raw: schema.clone(),
        }
    }

    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Iterate over required parameters.
    pub fn required(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|param| param.required)
    }

    /// Names of required parameters missing from an argument object.
    pub fn missing_required(&self, arguments: &Value) -> Vec<String> {
        let object = arguments.as_object();
        self.required()
            .filter(|param| object.is_none_or(|map| !map.contains_key(&param.name)))
            .map(|param| param.name.clone())
            .collect()
    }
}

/// A callable operation exposed by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    /// Name of the provider that owns this operation.
    pub provider: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: InputSchema,
}

impl OperationDescriptor {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        description: impl Into<String>,
        schema: &Value,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            description: description.into(),
            input_schema: InputSchema::from_json_schema(schema),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InputSchema, ParameterKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_properties_and_required_flags() {
        let schema = InputSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "search terms" },
                "limit": { "type": ["integer", "null"], "default": 5 },
                "mode": { "enum": ["fast", "deep"] }
            },
            "required": ["query"]
        }));

        let query = schema.parameter("query").expect("query");
        assert_eq!(query.kind, ParameterKind::String);
        assert_eq!(query.required, true);
        assert_eq!(query.description, "search terms");

        let limit = schema.parameter("limit").expect("limit");
        assert_eq!(limit.kind, ParameterKind::Integer);
        assert_eq!(limit.required, false);
        assert_eq!(limit.default, Some(json!(5)));

        let mode = schema.parameter("mode").expect("mode");
        assert_eq!(mode.kind, ParameterKind::Any);
        assert_eq!(mode.allowed.len(), 2);
    }

    #[test]
    fn reports_missing_required_arguments() {
        let schema = InputSchema::from_json_schema(&json!({
            "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
            "required": ["a", "b"]
        }));
        assert_eq!(schema.missing_required(&json!({ "a": 1 })), vec!["b".to_string()]);
        assert_eq!(schema.missing_required(&json!("not an object")).len(), 2);
    }

    #[test]
    fn non_object_schema_has_no_parameters() {
        let schema = InputSchema::from_json_schema(&json!(null));
        assert_eq!(schema.parameters.is_empty(), true);
    }
}
