use std::time::Duration;
use thiserror::Error;

/// Transport-level failures while talking to a provider process.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to spawn provider: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("provider io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("provider protocol error: {0}")]
    Protocol(String),
    #[error("provider returned error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("provider closed the connection")]
    Closed,
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

/// Failure of `ConnectionManager::call_operation`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("provider not connected: {0}")]
    NotConnected(String),
    #[error("provider {provider} has no operation {operation}")]
    UnknownOperation { provider: String, operation: String },
    #[error("operation {operation} on {provider} failed: {message}")]
    RemoteFailure {
        provider: String,
        operation: String,
        message: String,
    },
}
