//! Newline-delimited JSON-RPC messages exchanged with tool providers.
//!
//! Each message is a single JSON object on its own line. The client sends
//! `initialize`, then the `notifications/initialized` notification, then any
//! number of `tools/list` / `tools/call` requests.

use crate::operation::OperationDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";
/// Protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_LIST_OPERATIONS: &str = "tools/list";
pub const METHOD_CALL_OPERATION: &str = "tools/call";

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code for invalid params.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code for internal failures.
pub const INTERNAL_ERROR: i64 = -32603;

/// Outbound request or notification (notifications carry no id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: Value::Null,
        }
    }
}

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Inbound response. Exactly one of `result` / `error` is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(json!(id)),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(json!(id)),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Whether this response answers the request with the given id.
    pub fn answers(&self, id: u64) -> bool {
        match &self.id {
            Some(Value::Number(number)) => number.as_u64() == Some(id),
            Some(Value::String(text)) => text.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }
}

/// Params of the `initialize` handshake.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version }
    })
}

/// One operation as announced by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOperation {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

impl WireOperation {
    /// Attach the owning provider and parse the schema.
    pub fn into_descriptor(self, provider: &str) -> OperationDescriptor {
        OperationDescriptor::new(
            self.name,
            provider,
            self.description.unwrap_or_default(),
            &self.input_schema,
        )
    }
}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListOperationsResult {
    #[serde(default)]
    pub tools: Vec<WireOperation>,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOperationParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A content block returned by `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallOperationResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallOperationResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
        }
    }

    /// Concatenate all text blocks, newline separated.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn notification_omits_id_and_params() {
        let line = serde_json::to_string(&RpcRequest::notification(METHOD_INITIALIZED))
            .expect("serialize");
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        );
    }

    #[test]
    fn response_matches_numeric_and_string_ids() {
        let numeric: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#).expect("numeric");
        let string: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"7","result":{}}"#).expect("string");
        assert_eq!(numeric.answers(7), true);
        assert_eq!(string.answers(7), true);
        assert_eq!(numeric.answers(8), false);
    }

    #[test]
    fn list_result_converts_to_descriptors() {
        let result: ListOperationsResult = serde_json::from_value(json!({
            "tools": [{
                "name": "webSearch",
                "description": "Search the web",
                "inputSchema": { "type": "object", "properties": { "query": { "type": "string" } } }
            }]
        }))
        .expect("decode");
        let descriptor = result
            .tools
            .into_iter()
            .next()
            .expect("tool")
            .into_descriptor("web");
        assert_eq!(descriptor.provider, "web");
        assert_eq!(descriptor.input_schema.parameters.len(), 1);
    }

    #[test]
    fn call_result_joins_text_blocks() {
        let result = CallOperationResult {
            content: vec![
                ContentBlock::text("first"),
                ContentBlock {
                    kind: "image".to_string(),
                    text: None,
                },
                ContentBlock::text("second"),
            ],
            is_error: false,
        };
        assert_eq!(result.joined_text(), "first\nsecond");
    }
}
