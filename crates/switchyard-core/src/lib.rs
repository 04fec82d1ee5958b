//! Orchestration core: planning, execution, validation, fallback
//! arbitration, and the request entry point tying them together.

pub mod approval;
pub mod category;
pub mod documents;
pub mod error;
pub mod evaluation;
pub mod executor;
pub mod extract;
pub mod fallback;
pub mod orchestrator;
pub mod planner;
pub mod retrieval;
pub mod validator;

pub use approval::{ApprovalDecision, ApprovalHandler, ApprovalRequest, StaticApproval};
pub use category::{
    ArgumentSource, DefaultRule, OperationCategory, classify_operation, classify_prompt,
    derive_argument,
};
pub use documents::{JsonlDocumentStore, StoredDocument};
pub use error::OrchestratorError;
pub use evaluation::{
    DEFAULT_THRESHOLD, EvaluationReport, EvaluationScenario, ExpectedTool, ScenarioReport, Score,
    run_scenarios, step_efficiency, tool_correctness,
};
pub use executor::{Executor, StepResult, Synthesis, resolve_arguments, summarize, synthesize};
pub use extract::extract_json;
pub use fallback::{FallbackCoordinator, FallbackDecision};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, QueryOutcome};
pub use planner::{DroppedCandidate, ExecutionPlan, PlanSource, PlannedStep, Planner};
pub use retrieval::RetrievalFallback;
pub use validator::{
    Dimension, DimensionScore, DimensionScorer, ResponseValidator, ScorerError, ValidationInput,
    ValidationResult,
};
