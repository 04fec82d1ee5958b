//! Human-in-the-loop approval for operations a policy flags.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A planned operation awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub operation: String,
    pub provider: String,
    pub prompt: String,
    /// Reasons attached by the matching `requireApproval` rules.
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Allow,
    Deny,
}

/// Decides whether an approval-gated operation may run.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Answers every request the same way.
#[derive(Debug, Clone, Copy)]
pub struct StaticApproval(pub ApprovalDecision);

#[async_trait]
impl ApprovalHandler for StaticApproval {
    async fn request_approval(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        self.0
    }
}
