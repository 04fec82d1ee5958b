//! Provider connections and their lifecycle state machine.

use crate::error::{CallError, ProviderError};
use crate::registry::ProviderRegistry;
use crate::transport::{Connector, ProviderTransport};
use futures_util::future::join_all;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_config::ProvidersConfig;
use switchyard_protocol::wire::{
    CallOperationParams, CallOperationResult, ListOperationsResult, METHOD_CALL_OPERATION,
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_LIST_OPERATIONS, initialize_params,
};
use switchyard_protocol::{OperationDescriptor, ProviderDescriptor, ProviderState};

const CLIENT_NAME: &str = "switchyard";

struct ProviderConnection {
    descriptor: ProviderDescriptor,
    state: ProviderState,
    operations: Vec<OperationDescriptor>,
    last_error: Option<String>,
    transport: Option<Arc<dyn ProviderTransport>>,
}

impl ProviderConnection {
    fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            state: ProviderState::Discovered,
            operations: Vec::new(),
            last_error: None,
            transport: None,
        }
    }
}

/// Read-only view of one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub state: ProviderState,
    pub operations: Vec<String>,
    pub last_error: Option<String>,
}

/// Outcome of `connect_all`, by provider name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Owns one connection per discovered provider.
pub struct ConnectionManager {
    registry: Arc<ProviderRegistry>,
    connector: Arc<dyn Connector>,
    connections: RwLock<BTreeMap<String, ProviderConnection>>,
    call_timeout: Duration,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(registry: Arc<ProviderRegistry>, connector: Arc<dyn Connector>) -> Self {
        Self::with_config(registry, connector, &ProvidersConfig::default())
    }

    pub fn with_config(
        registry: Arc<ProviderRegistry>,
        connector: Arc<dyn Connector>,
        config: &ProvidersConfig,
    ) -> Self {
        Self {
            registry,
            connector,
            connections: RwLock::new(BTreeMap::new()),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The only place connection state changes. Illegal transitions are
    /// logged and rejected.
    fn transition(&self, name: &str, next: ProviderState, error: Option<String>) -> bool {
        let mut connections = self.connections.write();
        let Some(connection) = connections.get_mut(name) else {
            warn!("transition for unknown provider (name={})", name);
            return false;
        };
        let current = connection.state;
        if !current.can_transition_to(next) {
            warn!(
                "illegal provider transition rejected (name={}, from={}, to={})",
                name, current, next
            );
            return false;
        }
        debug!(
            "provider transition (name={}, from={}, to={})",
            name, current, next
        );
        connection.state = next;
        match next {
            ProviderState::Errored => {
                connection.last_error = error.clone();
                connection.transport = None;
                connection.operations.clear();
            }
            ProviderState::Discovered => {
                connection.transport = None;
                connection.operations.clear();
            }
            ProviderState::Connecting | ProviderState::Connected => {
                connection.last_error = None;
            }
        }
        drop(connections);
        self.registry.update_status(name, next, error);
        true
    }

    /// Spawn, handshake and enumerate one provider. Failures are recorded on
    /// the connection and reported as `false`.
    pub async fn connect(&self, descriptor: &ProviderDescriptor) -> bool {
        let name = descriptor.name.clone();
        {
            let mut connections = self.connections.write();
            let connection = connections
                .entry(name.clone())
                .or_insert_with(|| ProviderConnection::new(descriptor.clone()));
            if connection.state == ProviderState::Connected {
                return true;
            }
            connection.descriptor = descriptor.clone();
        }
        if !self.transition(&name, ProviderState::Connecting, None) {
            return false;
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.connect_timeout, self.establish(descriptor))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.connect_timeout)),
        };
        match outcome {
            Ok((transport, operations)) => {
                let count = operations.len();
                {
                    let mut connections = self.connections.write();
                    if let Some(connection) = connections.get_mut(&name) {
                        connection.transport = Some(transport);
                        connection.operations = operations;
                    }
                }
                self.transition(&name, ProviderState::Connected, None);
                info!(
                    "provider connected (name={}, operations={}, elapsed_ms={})",
                    name,
                    count,
                    started.elapsed().as_millis()
                );
                true
            }
            Err(err) => {
                warn!("provider connection failed (name={}, err={})", name, err);
                self.transition(&name, ProviderState::Errored, Some(err.to_string()));
                false
            }
        }
    }

    async fn establish(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<(Arc<dyn ProviderTransport>, Vec<OperationDescriptor>), ProviderError> {
        let transport: Arc<dyn ProviderTransport> =
            Arc::from(self.connector.open(descriptor).await?);
        let handshake = async {
            transport
                .request(
                    METHOD_INITIALIZE,
                    initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION")),
                )
                .await?;
            transport.notify(METHOD_INITIALIZED).await?;
            let listed = transport
                .request(METHOD_LIST_OPERATIONS, json!({}))
                .await?;
            let listed: ListOperationsResult = serde_json::from_value(listed)
                .map_err(|err| ProviderError::Protocol(format!("invalid tools/list: {err}")))?;
            Ok::<_, ProviderError>(
                listed
                    .tools
                    .into_iter()
                    .map(|tool| tool.into_descriptor(&descriptor.name))
                    .collect::<Vec<_>>(),
            )
        };
        match handshake.await {
            Ok(operations) => Ok((transport, operations)),
            Err(err) => {
                transport.close().await;
                Err(err)
            }
        }
    }

    /// Connect every discovered provider that is not already connected,
    /// concurrently.
    pub async fn connect_all(&self) -> ConnectSummary {
        let descriptors = self.registry.discover();
        let pending: Vec<ProviderDescriptor> = {
            let connections = self.connections.read();
            descriptors
                .into_iter()
                .filter(|descriptor| {
                    connections
                        .get(&descriptor.name)
                        .is_none_or(|connection| connection.state != ProviderState::Connected)
                })
                .collect()
        };
        let results = join_all(pending.iter().map(|descriptor| self.connect(descriptor))).await;

        let mut summary = ConnectSummary::default();
        for (descriptor, connected) in pending.into_iter().zip(results) {
            if connected {
                summary.succeeded.push(descriptor.name);
            } else {
                summary.failed.push(descriptor.name);
            }
        }
        info!(
            "provider connect pass finished (succeeded={}, failed={})",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }

    /// Invoke an operation. A remote failure or timeout marks the provider
    /// `Errored`; the other error kinds leave it untouched.
    pub async fn call_operation(
        &self,
        provider: &str,
        operation: &str,
        arguments: Value,
    ) -> Result<Value, CallError> {
        let transport = {
            let connections = self.connections.read();
            let connection = connections
                .get(provider)
                .filter(|connection| connection.state == ProviderState::Connected)
                .ok_or_else(|| CallError::NotConnected(provider.to_string()))?;
            if !connection.operations.iter().any(|op| op.name == operation) {
                return Err(CallError::UnknownOperation {
                    provider: provider.to_string(),
                    operation: operation.to_string(),
                });
            }
            connection
                .transport
                .clone()
                .ok_or_else(|| CallError::NotConnected(provider.to_string()))?
        };

        let params = serde_json::to_value(CallOperationParams {
            name: operation.to_string(),
            arguments,
        })
        .unwrap_or(Value::Null);
        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.call_timeout,
            transport.request(METHOD_CALL_OPERATION, params),
        )
        .await
        {
            Ok(Ok(value)) => match serde_json::from_value::<CallOperationResult>(value.clone()) {
                Ok(result) if result.is_error => Err(result.joined_text()),
                Ok(_) => Ok(value),
                Err(err) => Err(format!("invalid tools/call result: {err}")),
            },
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(ProviderError::Timeout(self.call_timeout).to_string()),
        };
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(value) => {
                info!(
                    "operation call succeeded (provider={}, operation={}, elapsed_ms={})",
                    provider, operation, elapsed_ms
                );
                Ok(value)
            }
            Err(message) => {
                warn!(
                    "operation call failed (provider={}, operation={}, elapsed_ms={}, err={})",
                    provider, operation, elapsed_ms, message
                );
                transport.close().await;
                self.transition(provider, ProviderState::Errored, Some(message.clone()));
                Err(CallError::RemoteFailure {
                    provider: provider.to_string(),
                    operation: operation.to_string(),
                    message,
                })
            }
        }
    }

    /// Operations of every connected provider, grouped by provider name.
    pub fn all_operations(&self) -> Vec<OperationDescriptor> {
        self.connections
            .read()
            .values()
            .filter(|connection| connection.state == ProviderState::Connected)
            .flat_map(|connection| connection.operations.iter().cloned())
            .collect()
    }

    /// First connected provider (by name) exposing `operation`.
    pub fn find_owner(&self, operation: &str) -> Option<OperationDescriptor> {
        self.connections
            .read()
            .values()
            .filter(|connection| connection.state == ProviderState::Connected)
            .find_map(|connection| {
                connection
                    .operations
                    .iter()
                    .find(|op| op.name == operation)
                    .cloned()
            })
    }

    pub fn state(&self, name: &str) -> Option<ProviderState> {
        self.connections.read().get(name).map(|connection| connection.state)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .read()
            .values()
            .map(|connection| ConnectionInfo {
                name: connection.descriptor.name.clone(),
                state: connection.state,
                operations: connection
                    .operations
                    .iter()
                    .map(|op| op.name.clone())
                    .collect(),
                last_error: connection.last_error.clone(),
            })
            .collect()
    }

    /// Stop a provider process and return it to `Discovered`.
    pub async fn disconnect(&self, name: &str) -> bool {
        let transport = {
            let connections = self.connections.read();
            match connections.get(name) {
                Some(connection) if connection.state != ProviderState::Discovered => {
                    connection.transport.clone()
                }
                _ => return false,
            }
        };
        if let Some(transport) = transport {
            transport.close().await;
        }
        let moved = self.transition(name, ProviderState::Discovered, None);
        if moved {
            info!("provider disconnected (name={})", name);
        }
        moved
    }

    pub async fn shutdown(&self) {
        let names: Vec<String> = self.connections.read().keys().cloned().collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }
}
