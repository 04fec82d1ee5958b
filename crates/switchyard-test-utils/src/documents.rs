use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use switchyard_protocol::{
    CollaboratorError, DocumentStore, FallbackPath, QueryContext, RetrievalAnswer,
};

/// Records indexed texts and answers every query with a fixed answer.
#[derive(Clone, Default)]
pub struct StubDocumentStore {
    answer: String,
    indexed: Arc<Mutex<Vec<String>>>,
}

impl StubDocumentStore {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            indexed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn indexed(&self) -> Vec<String> {
        self.indexed.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for StubDocumentStore {
    async fn query(&self, _text: &str) -> Result<RetrievalAnswer, CollaboratorError> {
        Ok(RetrievalAnswer {
            answer: self.answer.clone(),
            sources: vec!["stub".to_string()],
        })
    }

    async fn index_text(&self, text: &str) -> Result<(), CollaboratorError> {
        self.indexed.lock().push(text.to_string());
        Ok(())
    }
}

/// Fallback path with a canned answer, or a failure when built with `failing`.
#[derive(Clone)]
pub struct StubFallback {
    answer: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StubFallback {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompts the fallback was asked to answer.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl FallbackPath for StubFallback {
    async fn answer(
        &self,
        prompt: &str,
        _context: &QueryContext,
    ) -> Result<String, CollaboratorError> {
        self.prompts.lock().push(prompt.to_string());
        self.answer
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("fallback offline".to_string()))
    }
}
