//! Test helpers shared across Switchyard crates.

pub mod documents;
pub mod model;
pub mod providers;

pub use documents::{StubDocumentStore, StubFallback};
pub use model::{FailingModel, FixedModel, RecordingModel, SequenceModel};
pub use providers::{RecordedCall, ScriptedConnector, ScriptedProvider, ScriptedReply};
