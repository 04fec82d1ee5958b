//! Runs plan steps against provider connections and synthesizes a response.

use crate::category::derive_argument;
use crate::planner::{ExecutionPlan, PlannedStep};
use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use switchyard_config::ExecutionMode;
use switchyard_protocol::wire::CallOperationResult;
use switchyard_protocol::{CompletionModel, OperationDescriptor, QueryContext};
use switchyard_providers::ConnectionManager;

/// Outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// The step as executed, with resolved arguments.
    pub step: PlannedStep,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

pub struct Executor {
    connections: Arc<ConnectionManager>,
    mode: ExecutionMode,
}

impl Executor {
    pub fn new(connections: Arc<ConnectionManager>, mode: ExecutionMode) -> Self {
        Self { connections, mode }
    }

    /// Run every step. The result list has one entry per step, in plan
    /// order, and a failing step never stops the ones after it.
    pub async fn execute(&self, plan: &ExecutionPlan, prompt: &str) -> Vec<StepResult> {
        match self.mode {
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(plan.steps.len());
                for step in &plan.steps {
                    results.push(self.run_step(step, prompt).await);
                }
                results
            }
            ExecutionMode::Parallel => self.execute_parallel(plan, prompt).await,
        }
    }

    /// Steps of one provider run in order; providers run concurrently.
    async fn execute_parallel(&self, plan: &ExecutionPlan, prompt: &str) -> Vec<StepResult> {
        let mut lanes: BTreeMap<&str, Vec<(usize, &PlannedStep)>> = BTreeMap::new();
        for (index, step) in plan.steps.iter().enumerate() {
            lanes
                .entry(step.provider.as_str())
                .or_default()
                .push((index, step));
        }
        debug!(
            "executing plan in parallel (steps={}, providers={})",
            plan.steps.len(),
            lanes.len()
        );
        let lane_results = join_all(lanes.into_values().map(|lane| async move {
            let mut results = Vec::with_capacity(lane.len());
            for (index, step) in lane {
                results.push((index, self.run_step(step, prompt).await));
            }
            results
        }))
        .await;

        let mut indexed: Vec<(usize, StepResult)> = lane_results.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    async fn run_step(&self, step: &PlannedStep, prompt: &str) -> StepResult {
        let descriptor = self
            .connections
            .all_operations()
            .into_iter()
            .find(|op| op.name == step.operation && op.provider == step.provider);
        let mut step = step.clone();
        step.arguments = resolve_arguments(&step, descriptor.as_ref(), prompt);

        let started = Instant::now();
        let outcome = self
            .connections
            .call_operation(&step.provider, &step.operation, step.arguments.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                let output = match serde_json::from_value::<CallOperationResult>(value.clone()) {
                    Ok(result) => result.joined_text(),
                    Err(_) => value.to_string(),
                };
                info!(
                    "step succeeded (operation={}, provider={}, elapsed_ms={})",
                    step.operation, step.provider, elapsed_ms
                );
                StepResult {
                    step,
                    succeeded: true,
                    output: Some(output),
                    error: None,
                    elapsed_ms,
                }
            }
            Err(err) => {
                warn!(
                    "step failed (operation={}, provider={}, elapsed_ms={}, err={})",
                    step.operation, step.provider, elapsed_ms, err
                );
                StepResult {
                    step,
                    succeeded: false,
                    output: None,
                    error: Some(err.to_string()),
                    elapsed_ms,
                }
            }
        }
    }
}

/// Planner arguments with missing required parameters filled in.
///
/// Non-object arguments are discarded and rebuilt from defaults.
pub fn resolve_arguments(
    step: &PlannedStep,
    descriptor: Option<&OperationDescriptor>,
    prompt: &str,
) -> Value {
    let mut arguments = match &step.arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            debug!(
                "replacing non-object arguments (operation={}, arguments={})",
                step.operation, other
            );
            Map::new()
        }
    };
    if let Some(descriptor) = descriptor {
        for parameter in descriptor.input_schema.required() {
            if arguments.contains_key(&parameter.name) {
                continue;
            }
            match derive_argument(step.category, parameter, prompt) {
                Some(value) => {
                    arguments.insert(parameter.name.clone(), value);
                }
                None => debug!(
                    "no default for required parameter (operation={}, parameter={})",
                    step.operation, parameter.name
                ),
            }
        }
    }
    Value::Object(arguments)
}

/// Primary answer text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub text: String,
    /// False when the text is the deterministic summary.
    pub from_model: bool,
}

/// Turn step results into the primary answer.
///
/// Uses the model when one is available; without one, or when it fails or
/// answers with nothing, returns a plain summary of the step outputs.
pub async fn synthesize(
    model: Option<&dyn CompletionModel>,
    prompt: &str,
    context: &QueryContext,
    results: &[StepResult],
) -> Synthesis {
    if let Some(model) = model {
        match model.complete(&synthesis_prompt(prompt, context, results)).await {
            Ok(answer) if !answer.trim().is_empty() => {
                return Synthesis {
                    text: answer.trim().to_string(),
                    from_model: true,
                };
            }
            Ok(_) => warn!("synthesis model returned an empty answer (model={})", model.name()),
            Err(err) => warn!("synthesis model failed (model={}, err={})", model.name(), err),
        }
    }
    Synthesis {
        text: summarize(prompt, results),
        from_model: false,
    }
}

fn synthesis_prompt(prompt: &str, context: &QueryContext, results: &[StepResult]) -> String {
    let mut text = String::new();
    if results.is_empty() {
        text.push_str("Answer the following request.\n");
    } else {
        text.push_str("Answer the request using the operation results below.\n");
    }
    text.push_str(&format!("\nRequest: {prompt}\n"));
    if !context.is_empty() {
        text.push_str(&format!("Context: {}\n", Value::Object(context.clone())));
    }
    if !results.is_empty() {
        text.push_str("\nOperation results:\n");
        for (index, result) in results.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} ({}): {}\n",
                index + 1,
                result.step.operation,
                result.step.provider,
                step_line(result)
            ));
        }
    }
    text.push_str("\nAnswer:");
    text
}

fn step_line(result: &StepResult) -> String {
    if result.succeeded {
        result.output.clone().unwrap_or_default()
    } else {
        format!("failed: {}", result.error.as_deref().unwrap_or("unknown error"))
    }
}

/// Deterministic summary used when no model can synthesize.
pub fn summarize(prompt: &str, results: &[StepResult]) -> String {
    if results.is_empty() {
        return format!("No operations were run for \"{prompt}\" and no model is available to answer it.");
    }
    let mut text = format!("Results for \"{prompt}\":");
    for result in results {
        text.push_str(&format!(
            "\n- {} ({}): {}",
            result.step.operation,
            result.step.provider,
            step_line(result)
        ));
    }
    text
}
