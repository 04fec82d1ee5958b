//! Rule evaluation over copy-on-write snapshots.

use crate::defaults::default_document;
use crate::error::RulesError;
use crate::model::{Action, ConditionKind, MatchOperator, Rule, RuleDocument};
use log::{debug, info, warn};
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_protocol::QueryContext;

/// Inputs a rule can inspect. `operation`/`provider` are absent when a
/// response rather than a candidate operation is being judged.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub prompt: &'a str,
    pub context: &'a QueryContext,
    pub operation: Option<&'a str>,
    pub provider: Option<&'a str>,
}

impl<'a> EvaluationRequest<'a> {
    pub fn for_prompt(prompt: &'a str, context: &'a QueryContext) -> Self {
        Self {
            prompt,
            context,
            operation: None,
            provider: None,
        }
    }

    pub fn with_candidate(mut self, operation: &'a str, provider: &'a str) -> Self {
        self.operation = Some(operation);
        self.provider = Some(provider);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRule {
    pub id: String,
    pub priority: i32,
}

/// Combined decision of every matching rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluation {
    pub should_proceed: bool,
    pub requires_approval: bool,
    pub should_persist: bool,
    pub should_validate: bool,
    pub should_fallback: bool,
    pub should_log: bool,
    /// Highest priority first.
    pub matched_rules: Vec<MatchedRule>,
    /// Actions of the matched rules, in `matched_rules` order.
    pub actions: Vec<Action>,
    pub reasons: Vec<String>,
}

impl RuleEvaluation {
    pub fn matched_ids(&self) -> Vec<&str> {
        self.matched_rules.iter().map(|rule| rule.id.as_str()).collect()
    }
}

enum CompiledCondition {
    Always,
    Text {
        kind: ConditionKind,
        operator: MatchOperator,
        needle: String,
        /// `None` for a pattern that failed to compile; such conditions never match.
        pattern: Option<Regex>,
    },
}

impl CompiledCondition {
    fn compile(rule_id: &str, kind: ConditionKind, operator: MatchOperator, value: &str) -> Self {
        if kind == ConditionKind::Always {
            return CompiledCondition::Always;
        }
        let pattern = if operator == MatchOperator::PatternMatch {
            match RegexBuilder::new(value).case_insensitive(true).build() {
                Ok(regex) => Some(regex),
                Err(err) => {
                    warn!(
                        "invalid rule pattern ignored (rule={}, pattern={}, err={})",
                        rule_id, value, err
                    );
                    None
                }
            }
        } else {
            None
        };
        CompiledCondition::Text {
            kind,
            operator,
            needle: value.to_lowercase(),
            pattern,
        }
    }

    fn holds(&self, request: &EvaluationRequest<'_>) -> bool {
        let CompiledCondition::Text {
            kind,
            operator,
            needle,
            pattern,
        } = self
        else {
            return true;
        };
        let compare = |subject: &str| match operator {
            MatchOperator::PatternMatch => pattern
                .as_ref()
                .is_some_and(|regex| regex.is_match(subject)),
            _ => {
                let subject = subject.to_lowercase();
                match operator {
                    MatchOperator::Equals => subject == *needle,
                    MatchOperator::Contains => subject.contains(needle.as_str()),
                    MatchOperator::StartsWith => subject.starts_with(needle.as_str()),
                    MatchOperator::EndsWith => subject.ends_with(needle.as_str()),
                    MatchOperator::PatternMatch => false,
                }
            }
        };
        match kind {
            ConditionKind::OperationName => request.operation.is_some_and(compare),
            ConditionKind::ProviderName => request.provider.is_some_and(compare),
            ConditionKind::PromptContains | ConditionKind::PromptMatches => {
                compare(request.prompt)
            }
            ConditionKind::ContextHasKey => {
                request.context.keys().any(|key| compare(key.as_str()))
            }
            ConditionKind::Always => true,
        }
    }
}

struct CompiledRule {
    id: String,
    priority: i32,
    enabled: bool,
    conditions: Vec<CompiledCondition>,
    actions: Vec<Action>,
}

/// Immutable compiled view of a document. Evaluations hold one of these
/// while mutations build a replacement.
struct Snapshot {
    document: RuleDocument,
    /// Sorted by descending priority, document order among equals.
    rules: Vec<CompiledRule>,
}

impl Snapshot {
    fn compile(document: RuleDocument) -> Self {
        let mut rules: Vec<CompiledRule> = document
            .rules
            .iter()
            .map(|rule| CompiledRule {
                id: rule.id.clone(),
                priority: rule.priority,
                enabled: rule.enabled,
                conditions: rule
                    .conditions
                    .iter()
                    .map(|condition| {
                        CompiledCondition::compile(
                            &rule.id,
                            condition.kind,
                            condition.operator(),
                            &condition.value,
                        )
                    })
                    .collect(),
                actions: rule.actions.clone(),
            })
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { document, rules }
    }

    fn evaluate(&self, request: &EvaluationRequest<'_>) -> RuleEvaluation {
        let defaults = self.document.default_actions;
        let mut evaluation = RuleEvaluation {
            should_proceed: true,
            requires_approval: false,
            should_persist: defaults.persist_responses,
            should_validate: defaults.validate_responses,
            should_fallback: false,
            should_log: defaults.log_usage,
            matched_rules: Vec::new(),
            actions: Vec::new(),
            reasons: Vec::new(),
        };
        let mut allowed = false;
        let mut denied = false;

        for rule in self.rules.iter().filter(|rule| rule.enabled) {
            if !rule.conditions.iter().all(|condition| condition.holds(request)) {
                continue;
            }
            debug!(
                "rule matched (id={}, priority={}, operation={})",
                rule.id,
                rule.priority,
                request.operation.unwrap_or("-")
            );
            evaluation.matched_rules.push(MatchedRule {
                id: rule.id.clone(),
                priority: rule.priority,
            });
            for action in &rule.actions {
                match action {
                    Action::Allow => allowed = true,
                    Action::Deny { .. } => denied = true,
                    Action::RequireApproval { .. } => evaluation.requires_approval = true,
                    Action::LogUsage => evaluation.should_log = true,
                    Action::PersistToMemory => evaluation.should_persist = true,
                    Action::ValidateResponse => evaluation.should_validate = true,
                    Action::Fallback { .. } => evaluation.should_fallback = true,
                }
                if let Some(reason) = action.reason() {
                    evaluation.reasons.push(format!("{}: {}", rule.id, reason));
                }
                evaluation.actions.push(action.clone());
            }
        }

        evaluation.should_proceed = !denied || allowed;
        evaluation
    }
}

/// Policy engine holding the active rule set.
pub struct RulesEngine {
    path: Option<PathBuf>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RulesEngine {
    /// In-memory engine with no backing file.
    pub fn new(document: RuleDocument) -> Self {
        Self {
            path: None,
            snapshot: RwLock::new(Arc::new(Snapshot::compile(document))),
        }
    }

    /// Engine with the built-in rule set and no backing file.
    pub fn with_defaults() -> Self {
        Self::new(default_document())
    }

    /// Load a rules file. A missing or unreadable file is replaced by the
    /// default rule set, which is written back so the next load succeeds.
    pub fn load_rules(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = match read_document(&path) {
            Ok(document) => {
                info!(
                    "rules loaded (path={}, rules={})",
                    path.display(),
                    document.rules.len()
                );
                document
            }
            Err(err) => {
                warn!(
                    "rules unavailable, using defaults (path={}, err={})",
                    path.display(),
                    err
                );
                let document = default_document();
                if let Err(err) = write_document(&path, &document) {
                    warn!(
                        "failed to persist default rules (path={}, err={})",
                        path.display(),
                        err
                    );
                }
                document
            }
        };
        Self {
            path: Some(path),
            snapshot: RwLock::new(Arc::new(Snapshot::compile(document))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Evaluate against the snapshot current at call time.
    pub fn evaluate(&self, request: &EvaluationRequest<'_>) -> RuleEvaluation {
        let snapshot = self.snapshot.read().clone();
        snapshot.evaluate(request)
    }

    pub fn list(&self) -> Vec<Rule> {
        self.snapshot.read().document.rules.clone()
    }

    pub fn document(&self) -> RuleDocument {
        self.snapshot.read().document.clone()
    }

    pub fn add(&self, rule: Rule) -> Result<(), RulesError> {
        self.mutate(|document| {
            if document.rules.iter().any(|existing| existing.id == rule.id) {
                return Err(RulesError::DuplicateId(rule.id));
            }
            info!("rule added (id={}, priority={})", rule.id, rule.priority);
            document.rules.push(rule);
            Ok(())
        })
    }

    /// Remove a rule by id, returning it.
    pub fn remove(&self, id: &str) -> Result<Rule, RulesError> {
        self.mutate(|document| {
            let index = document
                .rules
                .iter()
                .position(|rule| rule.id == id)
                .ok_or_else(|| RulesError::UnknownRule(id.to_string()))?;
            info!("rule removed (id={})", id);
            Ok(document.rules.remove(index))
        })
    }

    /// Replace the rule with the same id.
    pub fn update(&self, rule: Rule) -> Result<(), RulesError> {
        self.mutate(|document| {
            let slot = document
                .rules
                .iter_mut()
                .find(|existing| existing.id == rule.id)
                .ok_or_else(|| RulesError::UnknownRule(rule.id.clone()))?;
            info!("rule updated (id={})", rule.id);
            *slot = rule;
            Ok(())
        })
    }

    /// Swap in the built-in rule set.
    pub fn reset(&self) {
        *self.snapshot.write() = Arc::new(Snapshot::compile(default_document()));
        info!("rules reset to defaults");
    }

    /// Write the current rule set to the backing file.
    pub fn save(&self) -> Result<(), RulesError> {
        let path = self.path.as_ref().ok_or(RulesError::NoPath)?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), RulesError> {
        let document = self.document();
        write_document(path, &document)?;
        info!(
            "rules saved (path={}, rules={})",
            path.display(),
            document.rules.len()
        );
        Ok(())
    }

    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut RuleDocument) -> Result<T, RulesError>,
    ) -> Result<T, RulesError> {
        let mut guard = self.snapshot.write();
        let mut document = guard.document.clone();
        let outcome = change(&mut document)?;
        *guard = Arc::new(Snapshot::compile(document));
        Ok(outcome)
    }
}

fn read_document(path: &Path) -> Result<RuleDocument, RulesError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_document(path: &Path, document: &RuleDocument) -> Result<(), RulesError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(document)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Condition;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    fn context() -> QueryContext {
        Map::new()
    }

    #[test]
    fn always_deny_blocks_every_candidate() {
        let engine = RulesEngine::new(RuleDocument::new(vec![
            Rule::new("lockdown", 10)
                .when(Condition::always())
                .then(Action::Deny { reason: None }),
        ]));
        let ctx = context();
        for (operation, provider) in [("webSearch", "web"), ("add", "math"), ("echo", "demo")] {
            let request =
                EvaluationRequest::for_prompt("anything", &ctx).with_candidate(operation, provider);
            assert_eq!(engine.evaluate(&request).should_proceed, false);
        }
        assert_eq!(
            engine
                .evaluate(&EvaluationRequest::for_prompt("no candidate", &ctx))
                .should_proceed,
            false
        );
    }

    #[test]
    fn allow_counterbalances_deny() {
        let engine = RulesEngine::new(RuleDocument::new(vec![
            Rule::new("deny-web", 5)
                .when(Condition::new(ConditionKind::ProviderName, "web"))
                .then(Action::Deny {
                    reason: Some("offline".to_string()),
                }),
            Rule::new("allow-search", 1)
                .when(Condition::new(ConditionKind::OperationName, "websearch"))
                .then(Action::Allow),
        ]));
        let ctx = context();
        let request = EvaluationRequest::for_prompt("news", &ctx).with_candidate("webSearch", "web");
        let evaluation = engine.evaluate(&request);
        assert_eq!(evaluation.should_proceed, true);
        assert_eq!(evaluation.matched_ids(), vec!["deny-web", "allow-search"]);
        assert_eq!(evaluation.reasons, vec!["deny-web: offline".to_string()]);

        let other = EvaluationRequest::for_prompt("news", &ctx).with_candidate("fetch", "web");
        assert_eq!(engine.evaluate(&other).should_proceed, false);
    }

    #[test]
    fn matched_rules_sorted_by_priority_and_all_actions_collected() {
        let engine = RulesEngine::new(RuleDocument::new(vec![
            Rule::new("low", 1)
                .when(Condition::always())
                .then(Action::PersistToMemory),
            Rule::new("high", 9)
                .when(Condition::new(ConditionKind::PromptContains, "DEPLOY"))
                .then(Action::RequireApproval { reason: None }),
            Rule::new("off", 20).when(Condition::always()).then(Action::Fallback { reason: None }).disabled(),
        ]));
        let ctx = context();
        let evaluation = engine.evaluate(&EvaluationRequest::for_prompt("please deploy now", &ctx));
        assert_eq!(
            evaluation.matched_rules,
            vec![
                MatchedRule {
                    id: "high".to_string(),
                    priority: 9
                },
                MatchedRule {
                    id: "low".to_string(),
                    priority: 1
                },
            ]
        );
        assert_eq!(evaluation.requires_approval, true);
        assert_eq!(evaluation.should_persist, true);
        assert_eq!(evaluation.should_fallback, false);
        assert_eq!(evaluation.actions.len(), 2);
    }

    #[test]
    fn invalid_pattern_never_matches() {
        let engine = RulesEngine::new(RuleDocument::new(vec![
            Rule::new("broken", 1)
                .when(Condition::new(ConditionKind::PromptMatches, "(unclosed"))
                .then(Action::Fallback { reason: None }),
        ]));
        let ctx = context();
        let evaluation = engine.evaluate(&EvaluationRequest::for_prompt("(unclosed", &ctx));
        assert_eq!(evaluation.matched_rules.is_empty(), true);
        assert_eq!(evaluation.should_fallback, false);
    }

    #[test]
    fn pattern_match_is_case_insensitive() {
        let engine = RulesEngine::new(RuleDocument::new(vec![
            Rule::new("rm", 1)
                .when(Condition::new(ConditionKind::PromptMatches, r"rm\s+-rf"))
                .then(Action::Deny { reason: None }),
        ]));
        let ctx = context();
        let evaluation = engine.evaluate(&EvaluationRequest::for_prompt("RM  -RF /tmp", &ctx));
        assert_eq!(evaluation.should_proceed, false);
    }

    #[test]
    fn context_key_condition_uses_operator() {
        let engine = RulesEngine::new(RuleDocument::new(vec![
            Rule::new("user-scoped", 1)
                .when(
                    Condition::new(ConditionKind::ContextHasKey, "user_")
                        .with_operator(MatchOperator::StartsWith),
                )
                .then(Action::PersistToMemory),
        ]));
        let mut ctx = context();
        ctx.insert("User_Id".to_string(), json!("42"));
        assert_eq!(
            engine
                .evaluate(&EvaluationRequest::for_prompt("hi", &ctx))
                .should_persist,
            true
        );
        assert_eq!(
            engine
                .evaluate(&EvaluationRequest::for_prompt("hi", &context()))
                .should_persist,
            false
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let engine = RulesEngine::with_defaults();
        let ctx = context();
        let request = EvaluationRequest::for_prompt("what time is it", &ctx).with_candidate("now", "clock");
        let first = engine.evaluate(&request);
        for _ in 0..5 {
            assert_eq!(engine.evaluate(&request), first);
        }
        assert_eq!(first.should_log, true);
        assert_eq!(first.should_validate, true);
    }

    #[test]
    fn crud_replaces_snapshot() {
        let engine = RulesEngine::new(RuleDocument::new(Vec::new()));
        engine
            .add(Rule::new("a", 1).when(Condition::always()).then(Action::LogUsage))
            .expect("add");
        assert!(matches!(
            engine.add(Rule::new("a", 2)),
            Err(RulesError::DuplicateId(_))
        ));
        engine
            .update(Rule::new("a", 3).when(Condition::always()).then(Action::Fallback { reason: None }))
            .expect("update");
        let ctx = context();
        assert_eq!(
            engine
                .evaluate(&EvaluationRequest::for_prompt("x", &ctx))
                .should_fallback,
            true
        );
        let removed = engine.remove("a").expect("remove");
        assert_eq!(removed.priority, 3);
        assert!(matches!(engine.remove("a"), Err(RulesError::UnknownRule(_))));
        assert_eq!(engine.list().is_empty(), true);
        assert!(matches!(engine.save(), Err(RulesError::NoPath)));
    }
}
