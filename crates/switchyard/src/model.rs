//! OpenAI-compatible chat completion client.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{Value, json};
use switchyard_config::ModelConfig;
use switchyard_protocol::{CollaboratorError, CompletionModel};

pub struct HttpCompletionModel {
    client: Client,
    config: ModelConfig,
    api_key: String,
}

impl HttpCompletionModel {
    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key: api_key.into(),
        }
    }

    /// Build from configuration when the API key variable is set and non-empty.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        Some(Self::new(config.clone(), api_key))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

/// First choice's message text from a chat completion response.
pub fn completion_text(body: &Value) -> Result<String, CollaboratorError> {
    let choice = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| CollaboratorError::InvalidResponse("no choices in response".to_string()))?;
    choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CollaboratorError::InvalidResponse("choice has no text content".to_string()))
}

#[async_trait]
impl CompletionModel for HttpCompletionModel {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.config.name,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        debug!(
            "sending completion request (model={}, prompt_len={})",
            self.config.name,
            prompt.len()
        );
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CollaboratorError::RequestFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::RequestFailed(format!("{status}: {text}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| CollaboratorError::InvalidResponse(err.to_string()))?;
        completion_text(&body)
    }
}
