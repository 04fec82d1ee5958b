//! Turns a prompt and the operation catalog into an execution plan.

use crate::approval::{ApprovalDecision, ApprovalHandler, ApprovalRequest};
use crate::category::{OperationCategory, classify_operation, classify_prompt, name_tokens, words};
use crate::extract::extract_json;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::cmp::Reverse;
use std::sync::Arc;
use switchyard_config::PlannerConfig;
use switchyard_protocol::{CompletionModel, OperationDescriptor, QueryContext};
use switchyard_rules::{EvaluationRequest, RulesEngine};

/// An operation bound to the provider that owns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub operation: String,
    pub provider: String,
    /// Planner-supplied arguments; the executor fills missing required ones.
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<OperationCategory>,
}

impl PlannedStep {
    fn for_operation(operation: &OperationDescriptor, arguments: Value) -> Self {
        Self {
            operation: operation.name.clone(),
            provider: operation.provider.clone(),
            arguments,
            category: classify_operation(operation),
        }
    }
}

/// Which planning phase produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Model,
    Heuristic,
    /// Nothing to plan with, or nothing matched.
    None,
}

/// A candidate removed by policy before execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedCandidate {
    pub operation: String,
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlannedStep>,
    pub source: PlanSource,
    pub dropped: Vec<DroppedCandidate>,
    /// Ids of rules that matched any candidate.
    pub matched_rules: Vec<String>,
}

impl ExecutionPlan {
    pub fn empty(source: PlanSource) -> Self {
        Self {
            steps: Vec::new(),
            source,
            dropped: Vec::new(),
            matched_rules: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn operations(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.operation.as_str()).collect()
    }
}

/// Policy check applied to every candidate regardless of planning phase.
struct PolicyGate<'a> {
    prompt: &'a str,
    context: &'a QueryContext,
    rules: &'a RulesEngine,
    approval: Option<&'a dyn ApprovalHandler>,
    dropped: Vec<DroppedCandidate>,
    matched_rules: Vec<String>,
}

impl PolicyGate<'_> {
    async fn admit(&mut self, operation: &OperationDescriptor) -> bool {
        let request = EvaluationRequest::for_prompt(self.prompt, self.context)
            .with_candidate(&operation.name, &operation.provider);
        let evaluation = self.rules.evaluate(&request);
        for matched in &evaluation.matched_rules {
            if !self.matched_rules.contains(&matched.id) {
                self.matched_rules.push(matched.id.clone());
            }
        }

        if !evaluation.should_proceed {
            let reason = if evaluation.reasons.is_empty() {
                "denied by policy".to_string()
            } else {
                format!("denied by policy ({})", evaluation.reasons.join("; "))
            };
            self.drop_candidate(operation, reason);
            return false;
        }
        if !evaluation.requires_approval {
            return true;
        }
        let Some(handler) = self.approval else {
            self.drop_candidate(
                operation,
                "approval required but no approval handler is configured".to_string(),
            );
            return false;
        };
        let decision = handler
            .request_approval(&ApprovalRequest {
                operation: operation.name.clone(),
                provider: operation.provider.clone(),
                prompt: self.prompt.to_string(),
                reasons: evaluation.reasons.clone(),
            })
            .await;
        info!(
            "approval decided (operation={}, provider={}, decision={:?})",
            operation.name, operation.provider, decision
        );
        match decision {
            ApprovalDecision::Allow => true,
            ApprovalDecision::Deny => {
                self.drop_candidate(operation, "approval denied".to_string());
                false
            }
        }
    }

    fn drop_candidate(&mut self, operation: &OperationDescriptor, reason: String) {
        info!(
            "candidate dropped (operation={}, provider={}, reason={})",
            operation.name, operation.provider, reason
        );
        self.dropped.push(DroppedCandidate {
            operation: operation.name.clone(),
            provider: operation.provider.clone(),
            reason,
        });
    }

    fn finish(self, steps: Vec<PlannedStep>, source: PlanSource) -> ExecutionPlan {
        ExecutionPlan {
            steps,
            source,
            dropped: self.dropped,
            matched_rules: self.matched_rules,
        }
    }
}

const STOPWORDS: &[&str] = &[
    "what", "with", "that", "this", "from", "about", "using", "please", "into", "your", "have",
    "will", "there", "their", "which", "would", "could", "should", "tell", "give", "show",
];

/// Prompt words worth matching against operation vocabulary.
fn significant_words(prompt: &str) -> Vec<String> {
    let normalized = prompt.replace('+', " plus ").replace('*', " times ");
    let mut found: Vec<String> = words(&normalized)
        .into_iter()
        .filter(|word| word.len() >= 3 && !STOPWORDS.contains(&word.as_str()))
        .collect();
    found.sort();
    found
}

/// Count of significant prompt words naming or describing the operation.
fn relevance(prompt_words: &[String], operation: &OperationDescriptor) -> usize {
    let mut vocabulary = name_tokens(&operation.name);
    vocabulary.extend(words(&operation.description));
    prompt_words
        .iter()
        .filter(|word| vocabulary.contains(*word))
        .count()
}

pub struct Planner {
    config: PlannerConfig,
    model: Option<Arc<dyn CompletionModel>>,
}

impl Planner {
    pub fn new(config: PlannerConfig, model: Option<Arc<dyn CompletionModel>>) -> Self {
        Self { config, model }
    }

    /// Build a plan. Never fails; the worst case is an empty plan.
    pub async fn plan(
        &self,
        prompt: &str,
        context: &QueryContext,
        catalog: &[OperationDescriptor],
        rules: &RulesEngine,
        approval: Option<&dyn ApprovalHandler>,
    ) -> ExecutionPlan {
        if catalog.is_empty() {
            debug!("no operations available, planning skipped");
            return ExecutionPlan::empty(PlanSource::None);
        }
        let mut gate = PolicyGate {
            prompt,
            context,
            rules,
            approval,
            dropped: Vec::new(),
            matched_rules: Vec::new(),
        };

        if self.config.model_assisted
            && let Some(model) = &self.model
        {
            if let Some(proposal) = self.model_proposal(model.as_ref(), prompt, context, catalog).await
            {
                let mut steps = Vec::new();
                for (operation, arguments) in proposal {
                    if steps.len() >= self.config.max_steps {
                        break;
                    }
                    if gate.admit(operation).await {
                        steps.push(PlannedStep::for_operation(operation, arguments));
                    }
                }
                info!(
                    "plan built (source=model, steps={}, dropped={})",
                    steps.len(),
                    gate.dropped.len()
                );
                return gate.finish(steps, PlanSource::Model);
            }
            debug!("model plan unusable, using heuristic planning");
        }

        let steps = self.heuristic(prompt, catalog, &mut gate).await;
        let source = if steps.is_empty() {
            PlanSource::None
        } else {
            PlanSource::Heuristic
        };
        info!(
            "plan built (source={:?}, steps={}, dropped={})",
            source,
            steps.len(),
            gate.dropped.len()
        );
        gate.finish(steps, source)
    }

    async fn model_proposal<'c>(
        &self,
        model: &dyn CompletionModel,
        prompt: &str,
        context: &QueryContext,
        catalog: &'c [OperationDescriptor],
    ) -> Option<Vec<(&'c OperationDescriptor, Value)>> {
        let request = planning_prompt(prompt, context, catalog, self.config.max_steps);
        let reply = match model.complete(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("planning model failed (model={}, err={})", model.name(), err);
                return None;
            }
        };
        let Some(payload) = extract_json(&reply) else {
            debug!("planning reply carried no JSON (model={})", model.name());
            return None;
        };
        parse_proposal(&payload, catalog)
    }

    /// Fixed-priority category matching, one step per matched category,
    /// then plain keyword overlap when no category yields a step.
    async fn heuristic(
        &self,
        prompt: &str,
        catalog: &[OperationDescriptor],
        gate: &mut PolicyGate<'_>,
    ) -> Vec<PlannedStep> {
        let prompt_words = significant_words(prompt);
        let mut steps: Vec<PlannedStep> = Vec::new();

        for category in classify_prompt(prompt) {
            if steps.len() >= self.config.max_steps {
                break;
            }
            let mut candidates: Vec<&OperationDescriptor> = catalog
                .iter()
                .filter(|operation| category.matches_operation(operation))
                .filter(|operation| {
                    !steps.iter().any(|step| {
                        step.operation == operation.name && step.provider == operation.provider
                    })
                })
                .collect();
            candidates.sort_by_key(|operation| Reverse(relevance(&prompt_words, operation)));
            for operation in candidates {
                if gate.admit(operation).await {
                    debug!(
                        "heuristic picked operation (category={}, operation={}, provider={})",
                        category, operation.name, operation.provider
                    );
                    steps.push(PlannedStep::for_operation(operation, json!({})));
                    break;
                }
            }
        }
        if !steps.is_empty() {
            return steps;
        }

        let mut scored: Vec<(usize, &OperationDescriptor)> = catalog
            .iter()
            .map(|operation| (relevance(&prompt_words, operation), operation))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by_key(|(score, _)| Reverse(*score));
        for (_, operation) in scored {
            if gate.admit(operation).await {
                debug!(
                    "heuristic keyword match (operation={}, provider={})",
                    operation.name, operation.provider
                );
                steps.push(PlannedStep::for_operation(operation, json!({})));
                break;
            }
        }
        steps
    }
}

fn planning_prompt(
    prompt: &str,
    context: &QueryContext,
    catalog: &[OperationDescriptor],
    max_steps: usize,
) -> String {
    let mut text = String::from(
        "You are a planning assistant. Choose the operations needed to answer the request.\n\nAvailable operations:\n",
    );
    for operation in catalog {
        text.push_str(&format!(
            "- {} (provider: {}): {}\n  input schema: {}\n",
            operation.name, operation.provider, operation.description, operation.input_schema.raw
        ));
    }
    text.push_str(&format!("\nRequest: {prompt}\n"));
    if !context.is_empty() {
        text.push_str(&format!("Context: {}\n", Value::Object(context.clone())));
    }
    text.push_str(&format!(
        "\nRespond with JSON only, using at most {max_steps} steps:\n\
         {{\"steps\": [{{\"operation\": \"<name>\", \"provider\": \"<provider>\", \"arguments\": {{}}}}]}}\n\
         Use an empty list when no operation is needed.\n"
    ));
    text
}

const LIST_KEYS: &[&str] = &["steps", "tools", "plan", "tool_calls", "operations"];
const NAME_KEYS: &[&str] = &["operation", "tool", "name", "function"];
const ARGUMENT_KEYS: &[&str] = &["arguments", "parameters", "args", "input"];

/// Interpret a model payload as a plan.
///
/// `None` means the payload is not plan-shaped, or every entry named an
/// unknown operation; `Some(empty)` is an explicit "no operations".
fn parse_proposal<'c>(
    payload: &Value,
    catalog: &'c [OperationDescriptor],
) -> Option<Vec<(&'c OperationDescriptor, Value)>> {
    let entries: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            if let Some(items) = LIST_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
            {
                items.iter().collect()
            } else if NAME_KEYS.iter().any(|key| map.contains_key(*key)) {
                vec![payload]
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if entries.is_empty() {
        return Some(Vec::new());
    }

    let resolved: Vec<(&OperationDescriptor, Value)> = entries
        .into_iter()
        .filter_map(|entry| {
            let resolved = resolve_entry(entry, catalog);
            if resolved.is_none() {
                warn!("model proposed an unknown operation (entry={})", entry);
            }
            resolved
        })
        .collect();
    if resolved.is_empty() {
        return None;
    }
    Some(resolved)
}

fn resolve_entry<'c>(
    entry: &Value,
    catalog: &'c [OperationDescriptor],
) -> Option<(&'c OperationDescriptor, Value)> {
    let (name, provider, arguments) = match entry {
        Value::String(name) => (name.as_str(), None, Value::Object(Map::new())),
        Value::Object(map) => {
            let name = NAME_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))?;
            let provider = map.get("provider").and_then(Value::as_str);
            let arguments = ARGUMENT_KEYS
                .iter()
                .find_map(|key| map.get(*key))
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            // Function-calling style payloads encode arguments as a string.
            let arguments = match arguments {
                Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                other => other,
            };
            (name, provider, arguments)
        }
        _ => return None,
    };
    catalog
        .iter()
        .find(|operation| {
            operation.name == name && provider.is_none_or(|provider| provider == operation.provider)
        })
        .map(|operation| (operation, arguments))
}
