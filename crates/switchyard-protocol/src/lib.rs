//! Shared types for Switchyard: provider descriptors, lifecycle states,
//! operation schemas, the provider wire protocol, and the collaborator
//! contracts (model, document store, fallback path).

mod collaborator;
mod operation;
mod provider;
pub mod wire;

pub use collaborator::{
    CollaboratorError, CompletionModel, DocumentStore, FallbackPath, RetrievalAnswer,
};
pub use operation::{InputSchema, OperationDescriptor, ParameterKind, ParameterSpec};
pub use provider::{ProviderDescriptor, ProviderState};

use serde_json::{Map, Value};

/// Free-form request context passed alongside a prompt.
pub type QueryContext = Map<String, Value>;
