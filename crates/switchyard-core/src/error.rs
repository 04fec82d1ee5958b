use thiserror::Error;

/// Errors surfaced by the orchestrator.
///
/// Provider, planning and validation problems are recovered internally and
/// recorded in the outcome metadata; only these reach the caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The primary answer was unusable and the fallback path failed too.
    #[error("fallback exhausted: {0}")]
    FallbackExhausted(String),
    /// Filesystem error while resolving defaults.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
