use thiserror::Error;

/// Errors raised by rule mutation and persistence.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("rules io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid rules document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rule already exists: {0}")]
    DuplicateId(String),
    #[error("unknown rule: {0}")]
    UnknownRule(String),
    /// `save` was called on an engine that was not loaded from a file.
    #[error("rules engine has no backing file")]
    NoPath,
}
