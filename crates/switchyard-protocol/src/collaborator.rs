//! Contracts for the external collaborators the orchestrator relies on.

use crate::QueryContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors returned by collaborator implementations.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator is not configured or cannot be reached.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    /// A request was sent but failed.
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// A response arrived but could not be used.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Reading or writing stored documents failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Single-shot text completion. No structured-output guarantee: callers
/// extract embedded JSON leniently.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Name used in logs and metadata.
    fn name(&self) -> &str {
        "model"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Answer produced by the document-retrieval subsystem.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Black-box document retrieval service.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, text: &str) -> Result<RetrievalAnswer, CollaboratorError>;

    async fn index_text(&self, text: &str) -> Result<(), CollaboratorError>;
}

/// Alternate, non-tool answering route used when the primary answer is
/// judged inadequate.
#[async_trait]
pub trait FallbackPath: Send + Sync {
    async fn answer(
        &self,
        prompt: &str,
        context: &QueryContext,
    ) -> Result<String, CollaboratorError>;
}
