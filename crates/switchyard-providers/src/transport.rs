use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::Value;
use switchyard_protocol::ProviderDescriptor;

/// An open request/response channel to one provider.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Send a request and wait for the response carrying the same id.
    /// Returns the `result` member; an `error` member becomes
    /// `ProviderError::Remote`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str) -> Result<(), ProviderError>;

    /// Terminate the provider. Safe to call more than once.
    async fn close(&self);
}

/// Opens transports for descriptors. Swapped for in-memory connectors in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Box<dyn ProviderTransport>, ProviderError>;
}
