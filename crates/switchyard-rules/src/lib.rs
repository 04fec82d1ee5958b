//! Declarative policy rules evaluated before operations run and after
//! responses are produced.

mod defaults;
mod engine;
mod error;
mod model;

pub use defaults::default_document;
pub use engine::{EvaluationRequest, MatchedRule, RuleEvaluation, RulesEngine};
pub use error::RulesError;
pub use model::{Action, Condition, ConditionKind, DefaultActions, MatchOperator, Rule, RuleDocument};
