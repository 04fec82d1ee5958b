//! Configuration schema for Switchyard.

use serde::{Deserialize, Serialize};

/// Root config for the orchestrator and CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchyardConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl SwitchyardConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> SwitchyardConfigBuilder {
        SwitchyardConfigBuilder::new()
    }
}

/// Builder for assembling a `SwitchyardConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct SwitchyardConfigBuilder {
    config: SwitchyardConfig,
}

impl SwitchyardConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SwitchyardConfig::default(),
        }
    }

    pub fn providers(mut self, providers: ProvidersConfig) -> Self {
        self.config.providers = providers;
        self
    }

    pub fn rules(mut self, rules: RulesConfig) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn planner(mut self, planner: PlannerConfig) -> Self {
        self.config.planner = planner;
        self
    }

    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executor = executor;
        self
    }

    pub fn validator(mut self, validator: ValidatorConfig) -> Self {
        self.config.validator = validator;
        self
    }

    pub fn fallback(mut self, fallback: FallbackConfig) -> Self {
        self.config.fallback = fallback;
        self
    }

    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = model;
        self
    }

    /// Finalize and return the built `SwitchyardConfig`.
    pub fn build(self) -> SwitchyardConfig {
        self.config
    }
}

/// Where provider definitions come from and how calls are bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Explicit provider config file; checked before the conventional paths.
    #[serde(default)]
    pub config_path: Option<String>,
    /// Extra candidate files checked after `config_path`.
    #[serde(default)]
    pub search_paths: Vec<String>,
    /// Upper bound for a single operation call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Upper bound for spawn + handshake + enumeration of one provider.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            search_paths: Vec::new(),
            call_timeout_ms: default_call_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    15_000
}

/// Rule document location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    /// Defaults to `~/.switchyard/rules.json`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Planner behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Ask the model for a plan before using keyword heuristics.
    #[serde(default = "default_true")]
    pub model_assisted: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model_assisted: true,
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    5
}

/// How plan steps are scheduled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One step at a time, in plan order.
    #[default]
    Sequential,
    /// Steps on different providers run concurrently; results keep plan order.
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Thresholds used by the response validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Responses scoring below this fall back.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// More issues than this fall back.
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,
    /// Shorter responses count as incoherent.
    #[serde(default = "default_min_response_length")]
    pub min_response_length: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_issues: default_max_issues(),
            min_response_length: default_min_response_length(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_max_issues() -> usize {
    3
}

fn default_min_response_length() -> usize {
    20
}

/// Fallback arbitration switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// When false the primary answer is always returned.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Keep real-time tool answers even when the validator objects.
    #[serde(default = "default_true")]
    pub real_time_override: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            real_time_override: true,
        }
    }
}

/// Document store used for persistence and the retrieval fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `~/.switchyard/memory/documents.jsonl`.
    #[serde(default)]
    pub path: Option<String>,
    /// Passages returned per retrieval query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

/// OpenAI-compatible completion endpoint used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Environment variable holding the API key; no key disables the model.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            name: default_model_name(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    800
}

fn default_true() -> bool {
    true
}
