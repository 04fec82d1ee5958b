//! Serialized form of the rules file.

use serde::{Deserialize, Serialize};

/// What a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    #[serde(rename = "matchesOperationName", alias = "operationName")]
    OperationName,
    #[serde(rename = "matchesProviderName", alias = "providerName")]
    ProviderName,
    PromptContains,
    #[serde(rename = "promptMatchesPattern", alias = "promptMatches")]
    PromptMatches,
    /// Holds when any context key satisfies the operator.
    ContextHasKey,
    Always,
}

impl ConditionKind {
    /// Operator used when a condition does not name one.
    pub fn default_operator(self) -> MatchOperator {
        match self {
            ConditionKind::PromptContains => MatchOperator::Contains,
            ConditionKind::PromptMatches => MatchOperator::PatternMatch,
            ConditionKind::OperationName
            | ConditionKind::ProviderName
            | ConditionKind::ContextHasKey
            | ConditionKind::Always => MatchOperator::Equals,
        }
    }
}

/// Case-insensitive comparison applied to the inspected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    PatternMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<MatchOperator>,
}

impl Condition {
    pub fn new(kind: ConditionKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            operator: None,
        }
    }

    pub fn always() -> Self {
        Self::new(ConditionKind::Always, "")
    }

    pub fn with_operator(mut self, operator: MatchOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn operator(&self) -> MatchOperator {
        self.operator
            .unwrap_or_else(|| self.kind.default_operator())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Allow,
    Deny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    RequireApproval {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    LogUsage,
    PersistToMemory,
    ValidateResponse,
    Fallback {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Action {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Action::Deny { reason }
            | Action::RequireApproval { reason }
            | Action::Fallback { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

/// A prioritized rule. All conditions must hold for it to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Higher runs first in the audit order.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            priority,
            enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_enabled() -> bool {
    true
}

/// Actions implied for every evaluation regardless of matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultActions {
    #[serde(default)]
    pub log_usage: bool,
    #[serde(default)]
    pub validate_responses: bool,
    #[serde(default)]
    pub persist_responses: bool,
}

/// Top-level rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub default_actions: DefaultActions,
}

impl RuleDocument {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            version: default_version(),
            rules,
            default_actions: DefaultActions::default(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_camel_case_document() {
        let document: RuleDocument = serde_json::from_value(json!({
            "version": "2",
            "rules": [{
                "id": "block-rm",
                "priority": 10,
                "conditions": [{ "type": "promptMatches", "value": "rm\\s+-rf" }],
                "actions": [{ "type": "deny", "reason": "destructive" }, { "type": "logUsage" }]
            }],
            "defaultActions": { "logUsage": true, "validateResponses": true }
        }))
        .expect("document");

        let rule = &document.rules[0];
        assert_eq!(rule.enabled, true);
        assert_eq!(rule.conditions[0].operator(), MatchOperator::PatternMatch);
        assert_eq!(
            rule.actions[0],
            Action::Deny {
                reason: Some("destructive".to_string())
            }
        );
        assert_eq!(document.default_actions.persist_responses, false);
    }

    #[test]
    fn explicit_operator_overrides_default() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "operationName",
            "value": "web",
            "operator": "startsWith"
        }))
        .expect("condition");
        assert_eq!(condition.operator(), MatchOperator::StartsWith);
    }

    #[test]
    fn condition_tags_serialize_with_full_names() {
        let conditions = vec![
            Condition::new(ConditionKind::OperationName, "webSearch"),
            Condition::new(ConditionKind::ProviderName, "web"),
            Condition::new(ConditionKind::PromptMatches, "news"),
        ];
        let tags: Vec<serde_json::Value> = conditions
            .iter()
            .map(|condition| serde_json::to_value(condition).expect("serialize")["type"].clone())
            .collect();
        assert_eq!(
            tags,
            vec![
                json!("matchesOperationName"),
                json!("matchesProviderName"),
                json!("promptMatchesPattern")
            ]
        );
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let result = serde_json::from_value::<Action>(json!({ "type": "explode" }));
        assert_eq!(result.is_err(), true);
    }
}
