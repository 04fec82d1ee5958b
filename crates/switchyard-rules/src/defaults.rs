use crate::model::{Action, Condition, DefaultActions, Rule, RuleDocument};

/// Built-in rule set: allow everything, log usage, validate responses.
pub fn default_document() -> RuleDocument {
    let mut allow_all = Rule::new("default-allow", 0)
        .when(Condition::always())
        .then(Action::Allow)
        .then(Action::LogUsage)
        .then(Action::ValidateResponse);
    allow_all.name = "Allow all operations".to_string();
    RuleDocument {
        default_actions: DefaultActions {
            log_usage: true,
            validate_responses: true,
            persist_responses: false,
        },
        ..RuleDocument::new(vec![allow_all])
    }
}
