//! In-memory providers that speak the provider protocol without processes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchyard_protocol::ProviderDescriptor;
use switchyard_protocol::wire::{
    CallOperationResult, INTERNAL_ERROR, METHOD_CALL_OPERATION, METHOD_INITIALIZE,
    METHOD_LIST_OPERATIONS, PROTOCOL_VERSION,
};
use switchyard_providers::{Connector, ProviderError, ProviderTransport};

/// How a scripted operation answers.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// `isError: true` result.
    ToolError(String),
    /// JSON-RPC error response.
    RpcError(String),
    /// Never answers.
    Hang,
}

/// One call observed by a scripted provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub provider: String,
    pub operation: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    name: String,
    operations: Vec<Value>,
    replies: HashMap<String, ScriptedReply>,
    refuse_connection: bool,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
            replies: HashMap::new(),
            refuse_connection: false,
        }
    }

    /// Declare an operation with a JSON input schema.
    pub fn operation(mut self, name: &str, description: &str, schema: Value) -> Self {
        self.operations.push(json!({
            "name": name,
            "description": description,
            "inputSchema": schema,
        }));
        self
    }

    pub fn reply(mut self, operation: &str, reply: ScriptedReply) -> Self {
        self.replies.insert(operation.to_string(), reply);
        self
    }

    /// Fail the handshake so the provider ends up `Errored`.
    pub fn refusing(mut self) -> Self {
        self.refuse_connection = true;
        self
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor::new(self.name.clone(), format!("scripted-{}", self.name))
    }
}

/// Connector over a fixed set of scripted providers. Clones share the call log.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    providers: HashMap<String, ScriptedProvider>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: ScriptedProvider) -> Self {
        self.providers.insert(provider.name.clone(), provider);
        self
    }

    /// Descriptors for every scripted provider, for building a registry.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.providers.values().map(ScriptedProvider::descriptor).collect()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Box<dyn ProviderTransport>, ProviderError> {
        let provider = self
            .providers
            .get(&descriptor.name)
            .cloned()
            .ok_or_else(|| {
                ProviderError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted provider {}", descriptor.name),
                ))
            })?;
        Ok(Box::new(ScriptedTransport {
            provider,
            calls: self.calls.clone(),
        }))
    }
}

struct ScriptedTransport {
    provider: ScriptedProvider,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            METHOD_INITIALIZE if self.provider.refuse_connection => Err(ProviderError::Remote {
                code: INTERNAL_ERROR,
                message: "handshake refused".to_string(),
            }),
            METHOD_INITIALIZE => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": self.provider.name }
            })),
            METHOD_LIST_OPERATIONS => Ok(json!({ "tools": self.provider.operations })),
            METHOD_CALL_OPERATION => {
                let operation = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                self.calls.lock().push(RecordedCall {
                    provider: self.provider.name.clone(),
                    operation: operation.clone(),
                    arguments: arguments.clone(),
                });
                let result = match self.provider.replies.get(&operation) {
                    Some(ScriptedReply::Text(text)) => CallOperationResult::text(text.clone()),
                    Some(ScriptedReply::ToolError(text)) => {
                        CallOperationResult::error(text.clone())
                    }
                    Some(ScriptedReply::RpcError(message)) => {
                        return Err(ProviderError::Remote {
                            code: INTERNAL_ERROR,
                            message: message.clone(),
                        });
                    }
                    Some(ScriptedReply::Hang) => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        return Err(ProviderError::Closed);
                    }
                    None => CallOperationResult::text(format!("{operation} {arguments}")),
                };
                serde_json::to_value(result).map_err(|err| ProviderError::Protocol(err.to_string()))
            }
            other => Err(ProviderError::Protocol(format!("unexpected method {other}"))),
        }
    }

    async fn notify(&self, _method: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn close(&self) {}
}
