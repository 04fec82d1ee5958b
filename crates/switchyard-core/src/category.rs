//! Operation categories and the default-argument table keyed by them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;
use switchyard_protocol::{OperationDescriptor, ParameterKind, ParameterSpec};

/// Coarse intent of a prompt or an operation.
///
/// Variants are listed in heuristic planning priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    RealTimeInformation,
    Calculation,
    FileSystem,
    DocumentRetrieval,
    GeneralAnalysis,
}

/// Where a default argument value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgumentSource {
    /// The full prompt text.
    Prompt,
    /// The n-th number mentioned in the prompt.
    PromptNumber(usize),
    /// Arithmetic verb named by the prompt (`add`, `subtract`, ...).
    ArithmeticOperator,
    /// The working directory, as `.`.
    CurrentDirectory,
    Text(&'static str),
    Integer(i64),
}

/// One row of the default-argument table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultRule {
    /// Parameter names the row applies to, compared case-insensitively.
    pub parameters: &'static [&'static str],
    pub source: ArgumentSource,
}

impl DefaultRule {
    const fn new(parameters: &'static [&'static str], source: ArgumentSource) -> Self {
        Self { parameters, source }
    }

    pub fn applies_to(&self, parameter: &str) -> bool {
        self.parameters
            .iter()
            .any(|name| name.eq_ignore_ascii_case(parameter))
    }
}

const REAL_TIME_DEFAULTS: &[DefaultRule] = &[
    DefaultRule::new(
        &["query", "q", "search", "searchQuery", "topic", "keywords"],
        ArgumentSource::Prompt,
    ),
    DefaultRule::new(
        &["limit", "count", "maxResults", "max_results", "num_results"],
        ArgumentSource::Integer(5),
    ),
];

const CALCULATION_DEFAULTS: &[DefaultRule] = &[
    DefaultRule::new(
        &["a", "x", "first", "left", "num1", "number1"],
        ArgumentSource::PromptNumber(0),
    ),
    DefaultRule::new(
        &["b", "y", "second", "right", "num2", "number2"],
        ArgumentSource::PromptNumber(1),
    ),
    DefaultRule::new(&["expression", "expr", "input"], ArgumentSource::Prompt),
    DefaultRule::new(
        &["operation", "op", "operator"],
        ArgumentSource::ArithmeticOperator,
    ),
];

const FILE_SYSTEM_DEFAULTS: &[DefaultRule] = &[
    DefaultRule::new(
        &["path", "directory", "dir", "folder", "root"],
        ArgumentSource::CurrentDirectory,
    ),
    DefaultRule::new(&["pattern", "glob"], ArgumentSource::Text("*")),
    DefaultRule::new(&["action"], ArgumentSource::Text("list")),
];

const DOCUMENT_RETRIEVAL_DEFAULTS: &[DefaultRule] = &[
    DefaultRule::new(
        &["query", "question", "q", "text", "prompt"],
        ArgumentSource::Prompt,
    ),
    DefaultRule::new(&["top_k", "topK", "limit", "k"], ArgumentSource::Integer(3)),
];

const GENERAL_ANALYSIS_DEFAULTS: &[DefaultRule] = &[DefaultRule::new(
    &["text", "input", "content", "prompt", "query", "data"],
    ArgumentSource::Prompt,
)];

impl OperationCategory {
    /// Every category, highest planning priority first.
    pub const ALL: [OperationCategory; 5] = [
        OperationCategory::RealTimeInformation,
        OperationCategory::Calculation,
        OperationCategory::FileSystem,
        OperationCategory::DocumentRetrieval,
        OperationCategory::GeneralAnalysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationCategory::RealTimeInformation => "real_time_information",
            OperationCategory::Calculation => "calculation",
            OperationCategory::FileSystem => "file_system",
            OperationCategory::DocumentRetrieval => "document_retrieval",
            OperationCategory::GeneralAnalysis => "general_analysis",
        }
    }

    fn prompt_keywords(self) -> &'static [&'static str] {
        match self {
            OperationCategory::RealTimeInformation => &[
                "today",
                "latest",
                "news",
                "now",
                "recent",
                "weather",
                "price",
                "stock",
                "live",
                "breaking",
                "trending",
                "this week",
                "right now",
            ],
            OperationCategory::Calculation => &[
                "calculate",
                "compute",
                "add",
                "sum",
                "plus",
                "multiply",
                "times",
                "product",
                "divide",
                "subtract",
                "minus",
                "math",
                "+",
                "*",
            ],
            OperationCategory::FileSystem => &[
                "file",
                "files",
                "directory",
                "folder",
                "path",
                "contents of",
                "ls",
            ],
            OperationCategory::DocumentRetrieval => &[
                "document",
                "documents",
                "docs",
                "knowledge base",
                "according to",
                "notes",
                "manual",
                "search for information",
                "look up",
            ],
            OperationCategory::GeneralAnalysis => &[
                "analyze",
                "analyse",
                "analysis",
                "summarize",
                "summarise",
                "explain",
                "compare",
                "review",
                "evaluate",
            ],
        }
    }

    fn operation_keywords(self) -> &'static [&'static str] {
        match self {
            OperationCategory::RealTimeInformation => &[
                "search", "web", "news", "browse", "weather", "realtime", "live",
                "fetch",
            ],
            OperationCategory::Calculation => &[
                "add", "sum", "multiply", "calc", "math", "subtract", "divide", "compute",
                "product",
            ],
            OperationCategory::FileSystem => &["file", "directory", "dir", "folder", "path", "fs"],
            OperationCategory::DocumentRetrieval => &[
                "rag", "retriev", "document", "knowledge", "index", "memory",
            ],
            OperationCategory::GeneralAnalysis => &["analy", "summar", "review", "insight"],
        }
    }

    /// Default-argument rows for operations of this category.
    pub fn default_rules(self) -> &'static [DefaultRule] {
        match self {
            OperationCategory::RealTimeInformation => REAL_TIME_DEFAULTS,
            OperationCategory::Calculation => CALCULATION_DEFAULTS,
            OperationCategory::FileSystem => FILE_SYSTEM_DEFAULTS,
            OperationCategory::DocumentRetrieval => DOCUMENT_RETRIEVAL_DEFAULTS,
            OperationCategory::GeneralAnalysis => GENERAL_ANALYSIS_DEFAULTS,
        }
    }

    /// Whether the prompt mentions this category's vocabulary.
    pub fn matches_prompt(self, prompt: &str) -> bool {
        let lowered = prompt.to_lowercase();
        let words = words(&lowered);
        self.prompt_keywords().iter().any(|keyword| {
            if keyword.chars().all(char::is_alphanumeric) {
                words.contains(*keyword)
            } else {
                lowered.contains(keyword)
            }
        })
    }

    /// Whether an operation's name or description belongs to this category.
    ///
    /// Names are split on case changes so `webSearch` yields `web` and
    /// `search`. Keywords of four or more letters also match as prefixes.
    pub fn matches_operation(self, operation: &OperationDescriptor) -> bool {
        let mut tokens = name_tokens(&operation.name);
        tokens.extend(words(&operation.description));
        self.operation_keywords().iter().any(|keyword| {
            tokens
                .iter()
                .any(|token| token == keyword || (keyword.len() >= 4 && token.starts_with(keyword)))
        })
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories the prompt mentions, highest priority first.
pub fn classify_prompt(prompt: &str) -> Vec<OperationCategory> {
    OperationCategory::ALL
        .into_iter()
        .filter(|category| category.matches_prompt(prompt))
        .collect()
}

/// First category (by priority) the operation belongs to.
pub fn classify_operation(operation: &OperationDescriptor) -> Option<OperationCategory> {
    OperationCategory::ALL
        .into_iter()
        .find(|category| category.matches_operation(operation))
}

/// Lowercased words of an identifier such as `listDirectory` or `web_search`.
pub(crate) fn name_tokens(name: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.insert(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            tokens.insert(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.insert(current);
    }
    tokens
}

/// Lowercased alphanumeric words of `text`.
pub(crate) fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn prompt_numbers(prompt: &str) -> Vec<f64> {
    let Ok(pattern) = Regex::new(r"-?\d+(?:\.\d+)?") else {
        return Vec::new();
    };
    pattern
        .find_iter(prompt)
        .filter_map(|found| found.as_str().parse::<f64>().ok())
        .collect()
}

fn arithmetic_operator(prompt: &str) -> &'static str {
    let lowered = prompt.to_lowercase();
    let words = words(&lowered);
    let mentions = |candidates: &[&str]| {
        candidates.iter().any(|word| {
            words.contains(*word)
                || (!word.chars().all(char::is_alphanumeric) && lowered.contains(word))
        })
    };
    if mentions(&["multiply", "times", "product", "*", "x"]) {
        "multiply"
    } else if mentions(&["subtract", "minus", "difference"]) {
        "subtract"
    } else if mentions(&["divide", "divided", "quotient", "/"]) {
        "divide"
    } else {
        "add"
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        json!(number as i64)
    } else {
        json!(number)
    }
}

fn resolve_source(source: ArgumentSource, prompt: &str) -> Option<Value> {
    match source {
        ArgumentSource::Prompt => Some(Value::String(prompt.to_string())),
        ArgumentSource::PromptNumber(index) => {
            prompt_numbers(prompt).get(index).copied().map(number_value)
        }
        ArgumentSource::ArithmeticOperator => {
            Some(Value::String(arithmetic_operator(prompt).to_string()))
        }
        ArgumentSource::CurrentDirectory => Some(Value::String(".".to_string())),
        ArgumentSource::Text(text) => Some(Value::String(text.to_string())),
        ArgumentSource::Integer(value) => Some(json!(value)),
    }
}

/// Coerce a derived value to the declared parameter kind.
fn coerce(value: Value, kind: ParameterKind) -> Option<Value> {
    match (kind, value) {
        (ParameterKind::String, Value::Number(number)) => Some(Value::String(number.to_string())),
        (ParameterKind::Number | ParameterKind::Integer, Value::String(text)) => {
            text.trim().parse::<f64>().ok().map(number_value)
        }
        (kind, value) if kind.accepts(&value) => Some(value),
        _ => None,
    }
}

/// Kind-based guess used when no table row names the parameter.
fn generic_default(parameter: &ParameterSpec, prompt: &str) -> Option<Value> {
    match parameter.kind {
        ParameterKind::String | ParameterKind::Any => Some(Value::String(prompt.to_string())),
        ParameterKind::Number | ParameterKind::Integer => {
            prompt_numbers(prompt).first().copied().map(number_value)
        }
        ParameterKind::Boolean => Some(Value::Bool(false)),
        ParameterKind::Array => Some(Value::Array(Vec::new())),
        ParameterKind::Object => Some(json!({})),
    }
}

/// Derive a value for a missing parameter.
///
/// Order: schema default, then the category table, then a guess from the
/// parameter kind when no table row names the parameter. Returns `None`
/// when nothing sensible can be derived.
pub fn derive_argument(
    category: Option<OperationCategory>,
    parameter: &ParameterSpec,
    prompt: &str,
) -> Option<Value> {
    if let Some(default) = &parameter.default {
        return Some(default.clone());
    }
    let row = category.and_then(|category| {
        category
            .default_rules()
            .iter()
            .find(|rule| rule.applies_to(&parameter.name))
    });
    let from_table = row.and_then(|rule| resolve_source(rule.source, prompt));
    if let Some(first) = parameter.allowed.first() {
        return from_table
            .filter(|value| parameter.allowed.contains(value))
            .or_else(|| Some(first.clone()));
    }
    match row {
        Some(_) => from_table.and_then(|value| coerce(value, parameter.kind)),
        None => generic_default(parameter, prompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn op(name: &str, description: &str) -> OperationDescriptor {
        OperationDescriptor::new(name, "p", description, &json!({}))
    }

    fn param(name: &str, kind: ParameterKind) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            kind,
            description: String::new(),
            required: true,
            default: None,
            allowed: Vec::new(),
        }
    }

    #[test]
    fn every_category_has_a_deriving_default_row() {
        let prompt = "compute 3 and 4 for today";
        for category in OperationCategory::ALL {
            let rules = category.default_rules();
            assert_eq!(rules.is_empty(), false, "{category} has no rows");
            for rule in rules {
                assert_eq!(
                    resolve_source(rule.source, prompt).is_some(),
                    true,
                    "{category} row {:?} derives nothing",
                    rule.parameters
                );
            }
        }
    }

    #[test]
    fn classifies_prompts_in_priority_order() {
        assert_eq!(
            classify_prompt("What's today's top news in semiconductors?"),
            vec![OperationCategory::RealTimeInformation]
        );
        assert_eq!(
            classify_prompt("add 4 and 5"),
            vec![OperationCategory::Calculation]
        );
        assert_eq!(
            classify_prompt("List the contents of the current directory"),
            vec![OperationCategory::FileSystem]
        );
        assert_eq!(classify_prompt("hello there").is_empty(), true);
    }

    #[test]
    fn classifies_operations_by_name_and_description() {
        assert_eq!(
            classify_operation(&op("webSearch", "Search the web")),
            Some(OperationCategory::RealTimeInformation)
        );
        assert_eq!(
            classify_operation(&op("multiply", "Multiply two numbers")),
            Some(OperationCategory::Calculation)
        );
        assert_eq!(
            classify_operation(&op("listDirectory", "List files")),
            Some(OperationCategory::FileSystem)
        );
        assert_eq!(
            classify_operation(&op("summarizeText", "Summarizes text")),
            Some(OperationCategory::GeneralAnalysis)
        );
        assert_eq!(classify_operation(&op("echo", "Echo text back")), None);
    }

    #[test]
    fn derives_calculation_operands_from_prompt() {
        let category = Some(OperationCategory::Calculation);
        let prompt = "Calculate 15 + 27 using the math tool";
        assert_eq!(
            derive_argument(category, &param("a", ParameterKind::Number), prompt),
            Some(json!(15))
        );
        assert_eq!(
            derive_argument(category, &param("b", ParameterKind::Number), prompt),
            Some(json!(27))
        );
        assert_eq!(
            derive_argument(category, &param("operation", ParameterKind::String), prompt),
            Some(json!("add"))
        );
        assert_eq!(
            derive_argument(category, &param("b", ParameterKind::Number), "add 4"),
            None
        );
    }

    #[test]
    fn schema_default_and_enum_win_over_table() {
        let mut path = param("path", ParameterKind::String);
        path.default = Some(json!("/tmp"));
        assert_eq!(
            derive_argument(Some(OperationCategory::FileSystem), &path, "list files"),
            Some(json!("/tmp"))
        );

        let mut action = param("action", ParameterKind::String);
        action.allowed = vec![json!("read"), json!("list")];
        assert_eq!(
            derive_argument(Some(OperationCategory::FileSystem), &action, "list files"),
            Some(json!("list"))
        );
    }

    #[test]
    fn falls_back_to_kind_guess() {
        assert_eq!(
            derive_argument(None, &param("text", ParameterKind::String), "hi"),
            Some(json!("hi"))
        );
        assert_eq!(
            derive_argument(None, &param("verbose", ParameterKind::Boolean), "hi"),
            Some(json!(false))
        );
    }
}
