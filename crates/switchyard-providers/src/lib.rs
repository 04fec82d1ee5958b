//! Tool provider discovery and connection management.
//!
//! `ProviderRegistry` reads provider definitions and tracks lifecycle state;
//! `ConnectionManager` spawns providers, speaks the line protocol with them
//! and exposes their operations.

mod error;
mod manager;
mod registry;
mod stdio;
mod transport;

pub use error::{CallError, ProviderError};
pub use manager::{ConnectSummary, ConnectionInfo, ConnectionManager};
pub use registry::{DiscoveryOptions, ProviderRegistry, RegistryStatus, parse_provider_config};
pub use stdio::{StdioConnector, StdioTransport};
pub use transport::{Connector, ProviderTransport};
