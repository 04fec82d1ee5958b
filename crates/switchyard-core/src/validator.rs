//! Heuristic quality scoring of a synthesized response.
//!
//! Four independent scorers each return a confidence and issue list; the
//! overall confidence is their weighted sum. A scorer that fails or panics
//! degrades the whole verdict to a neutral confidence that forces fallback.

use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use switchyard_config::ValidatorConfig;
use switchyard_protocol::QueryContext;
use thiserror::Error;

const DEGRADED_CONFIDENCE: f64 = 0.5;

/// Quality dimension scored by one scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Coherence,
    Accuracy,
    Completeness,
    Safety,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Coherence,
        Dimension::Accuracy,
        Dimension::Completeness,
        Dimension::Safety,
    ];

    pub fn weight(self) -> f64 {
        match self {
            Dimension::Coherence => 0.2,
            Dimension::Accuracy => 0.3,
            Dimension::Completeness => 0.2,
            Dimension::Safety => 0.3,
        }
    }
}

/// What a scorer looks at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub prompt: &'a str,
    pub response: &'a str,
    pub context: &'a QueryContext,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DimensionScore {
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl DimensionScore {
    fn perfect() -> Self {
        Self {
            confidence: 1.0,
            ..Self::default()
        }
    }

    fn penalize(&mut self, amount: f64, issue: impl Into<String>, suggestion: impl Into<String>) {
        self.confidence -= amount;
        self.issues.push(issue.into());
        self.suggestions.push(suggestion.into());
    }

    fn clamped(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("scorer failed: {0}")]
    Failed(String),
}

/// Scores one dimension of a response.
pub trait DimensionScorer: Send + Sync {
    fn dimension(&self) -> Dimension;

    fn score(&self, input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError>;
}

/// Verdict on a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Weighted combination of the four dimension scores, in `[0, 1]`.
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub should_fallback: bool,
    pub coherence: f64,
    pub accuracy: f64,
    pub completeness: f64,
    pub safety: f64,
    /// Safety issues alone; any of these forces fallback.
    pub safety_issues: Vec<String>,
    /// A scorer failed and the verdict is the neutral degraded one.
    pub degraded: bool,
}

impl ValidationResult {
    pub fn score(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Coherence => self.coherence,
            Dimension::Accuracy => self.accuracy,
            Dimension::Completeness => self.completeness,
            Dimension::Safety => self.safety,
        }
    }
}

fn contains_any<'a>(text: &str, markers: &[&'a str]) -> Vec<&'a str> {
    markers
        .iter()
        .filter(|marker| text.contains(*marker))
        .copied()
        .collect()
}

const ERROR_MARKERS: &[&str] = &[
    "error:",
    "exception",
    "traceback",
    "stack trace",
    "undefined",
    "null pointer",
    "failed to",
];

const INABILITY_MARKERS: &[&str] = &[
    "i cannot",
    "i can't",
    "i can not",
    "i am unable",
    "i'm unable",
    "unable to",
    "i am not able",
    "i'm not able",
    "i don't know",
    "i do not know",
    "as an ai",
];

pub struct CoherenceScorer {
    min_length: usize,
}

impl DimensionScorer for CoherenceScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Coherence
    }

    fn score(&self, input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError> {
        let response = input.response.trim();
        let mut score = DimensionScore::perfect();
        if response.is_empty() {
            score.penalize(1.0, "response is empty", "produce an answer");
            return Ok(score.clamped());
        }
        let lowered = response.to_lowercase();
        if !contains_any(&lowered, ERROR_MARKERS).is_empty() {
            score.penalize(
                0.3,
                "response contains error markers",
                "remove raw error output from the answer",
            );
        }
        if !contains_any(&lowered, INABILITY_MARKERS).is_empty() {
            score.penalize(
                0.3,
                "response expresses inability to answer",
                "try an alternate answering route",
            );
        }
        if response.chars().count() < self.min_length {
            score.penalize(
                0.3,
                format!("response is shorter than {} characters", self.min_length),
                "expand the answer",
            );
        }
        Ok(score.clamped())
    }
}

const HEDGING_MARKERS: &[&str] = &[
    "might",
    "maybe",
    "possibly",
    "perhaps",
    "i think",
    "i believe",
    "not sure",
    "probably",
    "it seems",
];

const PLACEHOLDER_MARKERS: &[&str] = &[
    "todo",
    "tbd",
    "lorem ipsum",
    "[insert",
    "<insert",
    "placeholder",
    "xxx",
];

pub struct AccuracyScorer;

impl DimensionScorer for AccuracyScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Accuracy
    }

    fn score(&self, input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError> {
        let lowered = input.response.to_lowercase();
        let mut score = DimensionScore::perfect();

        let hedges = HEDGING_MARKERS
            .iter()
            .filter(|marker| {
                if marker.contains(' ') {
                    lowered.contains(*marker)
                } else {
                    lowered
                        .split(|c: char| !c.is_alphanumeric())
                        .any(|word| word == **marker)
                }
            })
            .count();
        if hedges > 0 {
            score.penalize(
                (0.1 * hedges as f64).min(0.3),
                "response hedges instead of stating facts",
                "state findings directly",
            );
        }
        if !contains_any(&lowered, PLACEHOLDER_MARKERS).is_empty() {
            score.penalize(
                0.3,
                "response contains placeholder or incomplete markers",
                "fill in the missing content",
            );
        }
        if !input.context.is_empty() && !references_context(&lowered, input.context) {
            score.penalize(
                0.2,
                "response does not reference the supplied context",
                "use the provided context in the answer",
            );
        }
        Ok(score.clamped())
    }
}

/// Whether any context key or short scalar value shows up in the response.
fn references_context(lowered_response: &str, context: &QueryContext) -> bool {
    context.iter().any(|(key, value)| {
        let key = key.to_lowercase();
        if lowered_response.contains(&key) {
            return true;
        }
        let rendered = match value {
            Value::String(text) => text.to_lowercase(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            _ => return false,
        };
        !rendered.is_empty() && lowered_response.contains(&rendered)
    })
}

pub struct CompletenessScorer;

impl DimensionScorer for CompletenessScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Completeness
    }

    fn score(&self, input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError> {
        let prompt_words = input.prompt.split_whitespace().count().max(1);
        let answer_words = input.response.split_whitespace().count();
        // Longer prompts are taken as more complex and expect more text back.
        let expected_ratio = match prompt_words {
            0..=5 => 1.0,
            6..=15 => 2.0,
            _ => 3.0,
        };
        let ratio = answer_words as f64 / prompt_words as f64;
        let mut score = DimensionScore::perfect();
        if ratio < expected_ratio * 0.5 {
            score.penalize(
                0.3,
                "response is brief relative to the request",
                "cover every part of the request",
            );
        }
        let trimmed = input.response.trim_end();
        let truncated = trimmed.ends_with("...")
            || trimmed.ends_with('…')
            || trimmed.matches("```").count() % 2 == 1;
        if truncated {
            score.penalize(0.3, "response appears truncated", "complete the answer");
        }
        Ok(score.clamped())
    }
}

const DESTRUCTIVE_PATTERNS: &[&str] = &[
    r"\brm\s+-(?:rf|fr|r)\b",
    r"\bdrop\s+(?:table|database)\b",
    r"\btruncate\s+table\b",
    r"\bformat\s+[a-z]:",
    r"\bmkfs(?:\.\w+)?\b",
    r"\bdd\s+if=",
    r":\(\)\s*\{\s*:\|:&\s*\};:",
    r"\bshutdown\s+-[hr]\b",
    r"\bdel\s+/[fsq]\b",
    r"\bchmod\s+-r\s+777\s+/",
];

const REDACTION_MARKERS: &[&str] = &["[redacted]", "<redacted>", "[removed]", "█"];

pub struct SafetyScorer {
    destructive: Vec<Regex>,
}

impl SafetyScorer {
    pub fn new() -> Self {
        let destructive = DESTRUCTIVE_PATTERNS
            .iter()
            .filter_map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| {
                        warn!(
                            "invalid safety pattern ignored (pattern={}, err={})",
                            pattern, err
                        )
                    })
                    .ok()
            })
            .collect();
        Self { destructive }
    }
}

impl Default for SafetyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionScorer for SafetyScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Safety
    }

    fn score(&self, input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError> {
        let mut score = DimensionScore::perfect();
        if self
            .destructive
            .iter()
            .any(|pattern| pattern.is_match(input.response))
        {
            score.penalize(
                0.8,
                "response contains destructive commands",
                "remove destructive commands from the answer",
            );
        }
        if !contains_any(&input.response.to_lowercase(), REDACTION_MARKERS).is_empty() {
            score.penalize(
                0.3,
                "response contains redaction markers",
                "answer without redacted content",
            );
        }
        Ok(score.clamped())
    }
}

/// Runs the four scorers and combines their verdicts.
pub struct ResponseValidator {
    config: ValidatorConfig,
    scorers: Vec<Box<dyn DimensionScorer>>,
}

impl ResponseValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let scorers: Vec<Box<dyn DimensionScorer>> = vec![
            Box::new(CoherenceScorer {
                min_length: config.min_response_length,
            }),
            Box::new(AccuracyScorer),
            Box::new(CompletenessScorer),
            Box::new(SafetyScorer::new()),
        ];
        Self { config, scorers }
    }

    /// Replace the scorer for its dimension.
    pub fn with_scorer(mut self, scorer: Box<dyn DimensionScorer>) -> Self {
        let dimension = scorer.dimension();
        self.scorers.retain(|existing| existing.dimension() != dimension);
        self.scorers.push(scorer);
        self
    }

    fn scorer(&self, dimension: Dimension) -> Option<&dyn DimensionScorer> {
        self.scorers
            .iter()
            .find(|scorer| scorer.dimension() == dimension)
            .map(|scorer| scorer.as_ref())
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> ValidationResult {
        let mut scores = Vec::with_capacity(Dimension::ALL.len());
        for dimension in Dimension::ALL {
            let Some(scorer) = self.scorer(dimension) else {
                return degraded(format!("no scorer for {dimension:?}"));
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| scorer.score(input)));
            match outcome {
                Ok(Ok(score)) if score.confidence.is_finite() => {
                    scores.push((dimension, score.clamped()))
                }
                Ok(Ok(_)) => {
                    return degraded(format!("{dimension:?} scorer returned a non-finite score"));
                }
                Ok(Err(err)) => return degraded(format!("{dimension:?} {err}")),
                Err(_) => return degraded(format!("{dimension:?} scorer panicked")),
            }
        }

        let confidence = scores
            .iter()
            .map(|(dimension, score)| dimension.weight() * score.confidence)
            .sum::<f64>()
            .clamp(0.0, 1.0);
        let mut result = ValidationResult {
            confidence,
            issues: Vec::new(),
            suggestions: Vec::new(),
            should_fallback: false,
            coherence: 0.0,
            accuracy: 0.0,
            completeness: 0.0,
            safety: 0.0,
            safety_issues: Vec::new(),
            degraded: false,
        };
        for (dimension, score) in scores {
            match dimension {
                Dimension::Coherence => result.coherence = score.confidence,
                Dimension::Accuracy => result.accuracy = score.confidence,
                Dimension::Completeness => result.completeness = score.confidence,
                Dimension::Safety => {
                    result.safety = score.confidence;
                    result.safety_issues = score.issues.clone();
                }
            }
            result.issues.extend(score.issues);
            result.suggestions.extend(score.suggestions);
        }
        result.should_fallback = result.confidence < self.config.confidence_threshold
            || result.issues.len() > self.config.max_issues
            || !result.safety_issues.is_empty();

        if result.should_fallback {
            info!(
                "validation recommends fallback (confidence={:.2}, issues={}, safety_issues={})",
                result.confidence,
                result.issues.len(),
                result.safety_issues.len()
            );
        } else {
            debug!(
                "validation passed (confidence={:.2}, issues={})",
                result.confidence,
                result.issues.len()
            );
        }
        result
    }
}

fn degraded(reason: String) -> ValidationResult {
    warn!("validation degraded (reason={})", reason);
    ValidationResult {
        confidence: DEGRADED_CONFIDENCE,
        issues: vec![format!("validation degraded: {reason}")],
        suggestions: Vec::new(),
        should_fallback: true,
        coherence: DEGRADED_CONFIDENCE,
        accuracy: DEGRADED_CONFIDENCE,
        completeness: DEGRADED_CONFIDENCE,
        safety: DEGRADED_CONFIDENCE,
        safety_issues: Vec::new(),
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn validator() -> ResponseValidator {
        ResponseValidator::new(ValidatorConfig::default())
    }

    fn check(prompt: &str, response: &str) -> ValidationResult {
        validator().validate(&ValidationInput {
            prompt,
            response,
            context: &QueryContext::new(),
        })
    }

    struct Broken;

    impl DimensionScorer for Broken {
        fn dimension(&self) -> Dimension {
            Dimension::Accuracy
        }

        fn score(&self, _input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError> {
            Err(ScorerError::Failed("lexicon missing".to_string()))
        }
    }

    struct Panicking;

    impl DimensionScorer for Panicking {
        fn dimension(&self) -> Dimension {
            Dimension::Completeness
        }

        fn score(&self, _input: &ValidationInput<'_>) -> Result<DimensionScore, ScorerError> {
            panic!("scorer bug")
        }
    }

    #[test]
    fn clean_answer_passes() {
        let result = check(
            "Summarize the release notes",
            "The release adds parallel execution, a JSONL document store, and stricter configuration checks.",
        );
        assert_eq!(result.should_fallback, false);
        assert_eq!(result.issues, Vec::<String>::new());
        assert_eq!(result.confidence > 0.99, true);
    }

    #[test]
    fn weights_follow_dimensions() {
        let total: f64 = Dimension::ALL.iter().map(|dimension| dimension.weight()).sum();
        assert_eq!((total - 1.0).abs() < 1e-9, true);
    }

    #[test]
    fn confidence_stays_in_bounds() {
        let samples = [
            "",
            "x",
            "Error: exception traceback. I cannot help, maybe perhaps possibly TODO rm -rf / [redacted]...",
            "A complete and direct answer that covers the question fully and clearly.",
        ];
        for response in samples {
            let result = check("Explain why the build failed yesterday on the main branch", response);
            assert_eq!((0.0..=1.0).contains(&result.confidence), true, "{response}");
            for dimension in Dimension::ALL {
                assert_eq!((0.0..=1.0).contains(&result.score(dimension)), true);
            }
        }
    }

    #[test]
    fn any_safety_issue_forces_fallback() {
        let result = check(
            "How do I free disk space?",
            "Run rm -rf / to remove everything and free all of the disk space you have.",
        );
        assert_eq!(result.safety_issues.len(), 1);
        assert_eq!(result.should_fallback, true);
    }

    #[test]
    fn error_riddled_answer_exceeds_issue_cap() {
        let result = check("What is the capital of France?", "Error: I can't...");
        assert_eq!(result.issues.len() > 3, true);
        assert_eq!(result.should_fallback, true);
        assert_eq!(result.coherence < 0.5, true);
    }

    #[test]
    fn ignored_context_is_an_accuracy_issue() {
        let mut context = QueryContext::new();
        context.insert("customer".to_string(), json!("Acme"));
        let input = ValidationInput {
            prompt: "Draft a greeting",
            response: "Hello there, thanks for reaching out to us today!",
            context: &context,
        };
        let result = validator().validate(&input);
        assert_eq!(result.accuracy < 1.0, true);

        let input = ValidationInput {
            response: "Hello Acme, thanks for reaching out to us today!",
            ..input
        };
        assert_eq!(validator().validate(&input).accuracy, 1.0);
    }

    #[test]
    fn failing_scorer_degrades() {
        let result = validator()
            .with_scorer(Box::new(Broken))
            .validate(&ValidationInput {
                prompt: "hi",
                response: "hello, a perfectly reasonable greeting",
                context: &QueryContext::new(),
            });
        assert_eq!(result.degraded, true);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.should_fallback, true);
    }

    #[test]
    fn panicking_scorer_degrades() {
        let result = validator()
            .with_scorer(Box::new(Panicking))
            .validate(&ValidationInput {
                prompt: "hi",
                response: "hello, a perfectly reasonable greeting",
                context: &QueryContext::new(),
            });
        assert_eq!(result.degraded, true);
        assert_eq!(result.confidence, 0.5);
    }
}
