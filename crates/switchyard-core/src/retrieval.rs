//! Retrieval-backed fallback answering path.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use switchyard_protocol::{
    CollaboratorError, CompletionModel, DocumentStore, FallbackPath, QueryContext,
    RetrievalAnswer,
};

/// Answers from stored documents, optionally phrased by a model.
///
/// With passages and a model the model answers from the passages; with
/// only a model it answers directly; with only passages the passages are
/// the answer.
#[derive(Clone, Default)]
pub struct RetrievalFallback {
    documents: Option<Arc<dyn DocumentStore>>,
    model: Option<Arc<dyn CompletionModel>>,
}

impl RetrievalFallback {
    pub fn new(
        documents: Option<Arc<dyn DocumentStore>>,
        model: Option<Arc<dyn CompletionModel>>,
    ) -> Self {
        Self { documents, model }
    }

    async fn retrieve(&self, prompt: &str) -> Option<RetrievalAnswer> {
        let documents = self.documents.as_ref()?;
        match documents.query(prompt).await {
            Ok(answer) if !answer.answer.trim().is_empty() => Some(answer),
            Ok(_) => {
                debug!("retrieval found no passages");
                None
            }
            Err(err) => {
                warn!("retrieval query failed (err={})", err);
                None
            }
        }
    }
}

fn with_context(mut text: String, context: &QueryContext) -> String {
    if !context.is_empty() {
        text.push_str(&format!("Context: {}\n", Value::Object(context.clone())));
    }
    text
}

#[async_trait]
impl FallbackPath for RetrievalFallback {
    async fn answer(
        &self,
        prompt: &str,
        context: &QueryContext,
    ) -> Result<String, CollaboratorError> {
        let retrieved = self.retrieve(prompt).await;
        match (&self.model, retrieved) {
            (Some(model), Some(retrieved)) => {
                let request = with_context(
                    format!(
                        "Answer the question using the passages below.\n\nPassages:\n{}\n\nQuestion: {prompt}\n",
                        retrieved.answer
                    ),
                    context,
                );
                model.complete(&request).await
            }
            (Some(model), None) => {
                let request = with_context(format!("Question: {prompt}\n"), context);
                model.complete(&request).await
            }
            (None, Some(retrieved)) => Ok(retrieved.answer),
            (None, None) => Err(CollaboratorError::Unavailable(
                "no stored passages and no model to answer with".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use switchyard_test_utils::{FailingModel, RecordingModel, StubDocumentStore};

    #[tokio::test]
    async fn model_answers_from_passages() {
        let model = RecordingModel::fixed("grounded answer");
        let fallback = RetrievalFallback::new(
            Some(Arc::new(StubDocumentStore::new("passage about chips"))),
            Some(Arc::new(model.clone())),
        );
        let answer = fallback
            .answer("chips?", &QueryContext::new())
            .await
            .expect("answer");
        assert_eq!(answer, "grounded answer");
        assert_eq!(model.prompts()[0].contains("passage about chips"), true);
    }

    #[tokio::test]
    async fn passages_answer_without_model() {
        let fallback = RetrievalFallback::new(
            Some(Arc::new(StubDocumentStore::new("stored passage"))),
            None,
        );
        let answer = fallback
            .answer("anything", &QueryContext::new())
            .await
            .expect("answer");
        assert_eq!(answer, "stored passage");
    }

    #[tokio::test]
    async fn nothing_to_answer_with_is_an_error() {
        let fallback = RetrievalFallback::new(Some(Arc::new(StubDocumentStore::new(""))), None);
        assert_eq!(
            fallback.answer("q", &QueryContext::new()).await.is_err(),
            true
        );

        let fallback = RetrievalFallback::new(None, Some(Arc::new(FailingModel)));
        assert_eq!(
            fallback.answer("q", &QueryContext::new()).await.is_err(),
            true
        );
    }
}
