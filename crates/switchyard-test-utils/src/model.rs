use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use switchyard_protocol::{CollaboratorError, CompletionModel};

/// Always answers with the same text.
#[derive(Debug, Clone)]
pub struct FixedModel {
    response: String,
}

impl FixedModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl CompletionModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Ok(self.response.clone())
    }
}

/// Answers with queued responses in order, then with the fallback text.
#[derive(Debug)]
pub struct SequenceModel {
    responses: Mutex<VecDeque<String>>,
    exhausted: String,
}

impl SequenceModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            exhausted: String::new(),
        }
    }

    pub fn then_always(mut self, text: impl Into<String>) -> Self {
        self.exhausted = text.into();
        self
    }
}

#[async_trait]
impl CompletionModel for SequenceModel {
    fn name(&self) -> &str {
        "sequence"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.exhausted.clone()))
    }
}

/// Every call fails.
#[derive(Debug, Clone, Default)]
pub struct FailingModel;

#[async_trait]
impl CompletionModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::RequestFailed("model offline".to_string()))
    }
}

/// Wraps another model and records every prompt it receives.
#[derive(Clone)]
pub struct RecordingModel {
    inner: Arc<dyn CompletionModel>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingModel {
    pub fn new(inner: Arc<dyn CompletionModel>) -> Self {
        Self {
            inner,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(Arc::new(FixedModel::new(response)))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionModel for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        self.prompts.lock().push(prompt.to_string());
        self.inner.complete(prompt).await
    }
}
