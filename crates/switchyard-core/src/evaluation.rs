//! Deterministic tool-calling regression metrics and a scenario runner.

use crate::orchestrator::Orchestrator;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use switchyard_protocol::{DocumentStore, QueryContext};

/// Pass mark used when a caller does not pick one.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub value: f64,
    pub reason: String,
}

impl Score {
    fn pass(reason: &str) -> Self {
        Self {
            value: 1.0,
            reason: reason.to_string(),
        }
    }

    fn fail(reason: String) -> Self {
        Self { value: 0.0, reason }
    }
}

fn deviation(missing: &[&str], extra: &[&str]) -> Vec<String> {
    let mut details = Vec::new();
    if !missing.is_empty() {
        details.push(format!("missing {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        details.push(format!("extra {}", extra.join(", ")));
    }
    details
}

/// Whether the called tools exist and, with `exact_match`, are exactly the
/// expected set. An empty catalogue accepts any selection.
pub fn tool_correctness(
    called: &[String],
    available: &[String],
    expected: &[String],
    exact_match: bool,
) -> Score {
    if available.is_empty() {
        return Score::pass("no available tools catalogue provided; assuming selection is valid");
    }
    let unknown: BTreeSet<&str> = called
        .iter()
        .filter(|name| !available.contains(name))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Score::fail(format!(
            "agent invoked unsupported tools: {}",
            unknown.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    if exact_match {
        let called_set: BTreeSet<&str> = called.iter().map(String::as_str).collect();
        let expected_set: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
        let missing: Vec<&str> = expected_set.difference(&called_set).copied().collect();
        let extra: Vec<&str> = called_set.difference(&expected_set).copied().collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Score::fail(format!(
                "tool selection mismatch: {}",
                deviation(&missing, &extra).join("; ")
            ));
        }
    }
    Score::pass("tool selection matches expectation")
}

/// 1 only when the called sequence equals the expected one, order included.
pub fn step_efficiency(called: &[String], expected: &[String]) -> Score {
    if called == expected {
        return Score::pass("execution matched expected minimal tool sequence");
    }
    let missing: Vec<&str> = expected
        .iter()
        .filter(|name| !called.contains(name))
        .map(String::as_str)
        .collect();
    let extra: Vec<&str> = called
        .iter()
        .filter(|name| !expected.contains(name))
        .map(String::as_str)
        .collect();
    let mut details = deviation(&missing, &extra);
    if details.is_empty() {
        details.push("tool order differed from expectation".to_string());
    }
    Score::fail(format!(
        "trace deviated from expected sequence: {}",
        details.join("; ")
    ))
}

/// An expected tool, by name or as `{ "name", "parameters" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedTool {
    Name(String),
    Call {
        name: String,
        #[serde(default)]
        parameters: Value,
    },
}

impl ExpectedTool {
    pub fn name(&self) -> &str {
        match self {
            ExpectedTool::Name(name) | ExpectedTool::Call { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScenario {
    pub name: String,
    pub prompt: String,
    pub expected_tools: Vec<ExpectedTool>,
    /// Texts indexed into the document store before the prompt runs.
    #[serde(default)]
    pub index_texts: Vec<String>,
    #[serde(default)]
    pub context: QueryContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub tools_called: Vec<String>,
    pub tool_correctness: Score,
    pub step_efficiency: Score,
    pub passed: bool,
    /// Set when the query itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub scenarios: Vec<ScenarioReport>,
}

impl EvaluationReport {
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(|scenario| scenario.passed)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.scenarios
            .iter()
            .filter(|scenario| !scenario.passed)
            .map(|scenario| scenario.name.as_str())
            .collect()
    }
}

/// Run each scenario through the orchestrator and score its tool calls.
pub async fn run_scenarios(
    orchestrator: &Orchestrator,
    documents: Option<&dyn DocumentStore>,
    scenarios: &[EvaluationScenario],
    threshold: f64,
) -> EvaluationReport {
    let available: Vec<String> = orchestrator
        .operations()
        .into_iter()
        .map(|operation| operation.name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut reports = Vec::with_capacity(scenarios.len());

    for scenario in scenarios {
        if let Some(documents) = documents {
            for text in &scenario.index_texts {
                if let Err(err) = documents.index_text(text).await {
                    warn!(
                        "scenario text not indexed (scenario={}, err={})",
                        scenario.name, err
                    );
                }
            }
        }
        let expected: Vec<String> = scenario
            .expected_tools
            .iter()
            .map(|tool| tool.name().to_string())
            .collect();
        let (tools_called, error) = match orchestrator
            .process_query(&scenario.prompt, &scenario.context)
            .await
        {
            Ok(outcome) => (outcome.tools_used, None),
            Err(err) => (Vec::new(), Some(err.to_string())),
        };
        let correctness = tool_correctness(&tools_called, &available, &expected, true);
        let efficiency = step_efficiency(&tools_called, &expected);
        let passed =
            error.is_none() && correctness.value >= threshold && efficiency.value >= threshold;
        info!(
            "scenario evaluated (name={}, passed={}, selection={}, efficiency={})",
            scenario.name, passed, correctness.value, efficiency.value
        );
        reports.push(ScenarioReport {
            name: scenario.name.clone(),
            tools_called,
            tool_correctness: correctness,
            step_efficiency: efficiency,
            passed,
            error,
        });
    }

    EvaluationReport {
        threshold,
        scenarios: reports,
    }
}
