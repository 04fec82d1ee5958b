//! Request entry point: plan, execute, synthesize, validate, arbitrate.

use crate::approval::ApprovalHandler;
use crate::error::OrchestratorError;
use crate::executor::{Executor, StepResult, synthesize};
use crate::fallback::{FallbackCoordinator, FallbackDecision};
use crate::planner::{ExecutionPlan, Planner};
use crate::retrieval::RetrievalFallback;
use crate::validator::{ResponseValidator, ValidationInput, ValidationResult};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use switchyard_config::SwitchyardConfig;
use switchyard_protocol::{
    CompletionModel, DocumentStore, FallbackPath, OperationDescriptor, QueryContext,
};
use switchyard_providers::{
    ConnectSummary, ConnectionInfo, ConnectionManager, Connector, DiscoveryOptions,
    ProviderRegistry, RegistryStatus, StdioConnector,
};
use switchyard_rules::{EvaluationRequest, RuleEvaluation, RulesEngine};
use tokio::sync::Mutex;

/// What a caller gets back from `process_query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub response: String,
    /// Operations attempted, in plan order.
    pub tools_used: Vec<String>,
    pub used_primary_path: bool,
    pub fallback_used: bool,
    pub persisted: bool,
    /// Audit trail of every decision taken for the request.
    pub metadata: Map<String, Value>,
}

/// Assembles an [`Orchestrator`]. Every collaborator is optional; the
/// defaults are stdio providers discovered from the configuration, the
/// built-in rule set, and no model.
pub struct OrchestratorBuilder {
    config: SwitchyardConfig,
    registry: Option<Arc<ProviderRegistry>>,
    connector: Option<Arc<dyn Connector>>,
    rules: Option<Arc<RulesEngine>>,
    model: Option<Arc<dyn CompletionModel>>,
    documents: Option<Arc<dyn DocumentStore>>,
    fallback: Option<Arc<dyn FallbackPath>>,
    approval: Option<Arc<dyn ApprovalHandler>>,
}

impl OrchestratorBuilder {
    pub fn new(config: SwitchyardConfig) -> Self {
        Self {
            config,
            registry: None,
            connector: None,
            rules: None,
            model: None,
            documents: None,
            fallback: None,
            approval: None,
        }
    }

    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn rules(mut self, rules: Arc<RulesEngine>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Override the fallback path. Without one, a retrieval fallback over
    /// the document store and model is used when either is present.
    pub fn fallback_path(mut self, fallback: Arc<dyn FallbackPath>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn approval_handler(mut self, approval: Arc<dyn ApprovalHandler>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let cwd = std::env::current_dir()?;
                Arc::new(ProviderRegistry::new(DiscoveryOptions::from_config(
                    &self.config.providers,
                    cwd,
                )))
            }
        };
        let connector = self.connector.unwrap_or_else(|| Arc::new(StdioConnector));
        let connections = Arc::new(ConnectionManager::with_config(
            registry.clone(),
            connector,
            &self.config.providers,
        ));
        let rules = self
            .rules
            .unwrap_or_else(|| Arc::new(RulesEngine::with_defaults()));
        let fallback = self.fallback.or_else(|| {
            (self.documents.is_some() || self.model.is_some()).then(|| {
                Arc::new(RetrievalFallback::new(
                    self.documents.clone(),
                    self.model.clone(),
                )) as Arc<dyn FallbackPath>
            })
        });
        info!(
            "orchestrator built (model={}, documents={}, fallback={}, mode={:?})",
            self.model.as_ref().map(|model| model.name()).unwrap_or("none"),
            self.documents.is_some(),
            fallback.is_some(),
            self.config.executor.mode
        );

        Ok(Orchestrator {
            planner: Planner::new(self.config.planner.clone(), self.model.clone()),
            executor: Executor::new(connections.clone(), self.config.executor.mode),
            validator: ResponseValidator::new(self.config.validator.clone()),
            coordinator: FallbackCoordinator::new(self.config.fallback.clone()),
            config: self.config,
            registry,
            connections,
            rules,
            model: self.model,
            documents: self.documents,
            fallback,
            approval: self.approval,
            request_lock: Mutex::new(()),
        })
    }
}

/// Owns the provider connections and serves one request at a time.
pub struct Orchestrator {
    config: SwitchyardConfig,
    registry: Arc<ProviderRegistry>,
    connections: Arc<ConnectionManager>,
    rules: Arc<RulesEngine>,
    model: Option<Arc<dyn CompletionModel>>,
    documents: Option<Arc<dyn DocumentStore>>,
    fallback: Option<Arc<dyn FallbackPath>>,
    approval: Option<Arc<dyn ApprovalHandler>>,
    planner: Planner,
    executor: Executor,
    validator: ResponseValidator,
    coordinator: FallbackCoordinator,
    request_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn builder(config: SwitchyardConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Discover providers and connect to every one not yet connected.
    /// Also the way to retry providers that ended up `Errored`.
    pub async fn initialize(&self) -> ConnectSummary {
        let summary = self.connections.connect_all().await;
        info!(
            "orchestrator initialized (connected={}, failed={})",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }

    pub fn rules(&self) -> &Arc<RulesEngine> {
        &self.rules
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn status(&self) -> RegistryStatus {
        self.registry.status()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections.connections()
    }

    pub fn operations(&self) -> Vec<OperationDescriptor> {
        self.connections.all_operations()
    }

    pub async fn shutdown(&self) {
        self.connections.shutdown().await;
    }

    /// Answer a prompt. The only error is a failed primary path whose
    /// fallback also failed; provider, planning and validation problems are
    /// recorded in the outcome metadata instead.
    pub async fn process_query(
        &self,
        prompt: &str,
        context: &QueryContext,
    ) -> Result<QueryOutcome, OrchestratorError> {
        let _guard = self.request_lock.lock().await;
        debug!("processing query (prompt_len={}, context_keys={})", prompt.len(), context.len());

        let catalog = self.connections.all_operations();
        let plan = self
            .planner
            .plan(prompt, context, &catalog, &self.rules, self.approval.as_deref())
            .await;
        let results = self.executor.execute(&plan, prompt).await;
        let primary = synthesize(self.model.as_deref(), prompt, context, &results).await;
        let primary_failed = if results.is_empty() {
            !primary.from_model
        } else {
            results.iter().all(|result| !result.succeeded)
        };

        let policy = self
            .rules
            .evaluate(&EvaluationRequest::for_prompt(prompt, context));
        let validation = policy.should_validate.then(|| {
            self.validator.validate(&ValidationInput {
                prompt,
                response: &primary.text,
                context,
            })
        });
        let decision = self.coordinator.decide(
            prompt,
            validation.as_ref(),
            policy.should_fallback,
            primary_failed,
            &results,
        );

        let (response, used_primary_path, fallback_used, fallback_error) = if decision.use_fallback
        {
            match self.run_fallback(prompt, context).await {
                Ok(answer) => (answer, false, true, None),
                Err(err) if primary_failed => {
                    warn!("fallback exhausted (err={})", err);
                    return Err(OrchestratorError::FallbackExhausted(err));
                }
                Err(err) => {
                    warn!("fallback failed, keeping primary answer (err={})", err);
                    (primary.text, true, false, Some(err))
                }
            }
        } else {
            (primary.text, true, false, None)
        };

        let persisted = if policy.should_persist && self.config.memory.enabled {
            self.persist(prompt, &response).await
        } else {
            false
        };

        let tools_used: Vec<String> = results
            .iter()
            .map(|result| result.step.operation.clone())
            .collect();
        if policy.should_log {
            info!(
                "query answered (tools={:?}, primary={}, fallback={}, persisted={})",
                tools_used, used_primary_path, fallback_used, persisted
            );
        }

        Ok(QueryOutcome {
            response,
            tools_used,
            used_primary_path,
            fallback_used,
            persisted,
            metadata: audit_metadata(
                &plan,
                &results,
                &policy,
                validation.as_ref(),
                &decision,
                primary_failed,
                fallback_error,
            ),
        })
    }

    async fn run_fallback(&self, prompt: &str, context: &QueryContext) -> Result<String, String> {
        let Some(fallback) = &self.fallback else {
            return Err("no fallback path configured".to_string());
        };
        match fallback.answer(prompt, context).await {
            Ok(answer) if !answer.trim().is_empty() => Ok(answer),
            Ok(_) => Err("fallback returned an empty answer".to_string()),
            Err(err) => Err(err.to_string()),
        }
    }

    async fn persist(&self, prompt: &str, response: &str) -> bool {
        let Some(documents) = &self.documents else {
            debug!("persistence requested but no document store is configured");
            return false;
        };
        match documents
            .index_text(&format!("Q: {prompt}\nA: {response}"))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!("persisting answer failed (err={})", err);
                false
            }
        }
    }
}

fn audit_metadata(
    plan: &ExecutionPlan,
    results: &[StepResult],
    policy: &RuleEvaluation,
    validation: Option<&ValidationResult>,
    decision: &FallbackDecision,
    primary_failed: bool,
    fallback_error: Option<String>,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("plan_source".to_string(), json!(plan.source));
    metadata.insert("primary_failed".to_string(), json!(primary_failed));
    metadata.insert(
        "dropped_candidates".to_string(),
        serde_json::to_value(&plan.dropped).unwrap_or(Value::Null),
    );
    metadata.insert("candidate_rules".to_string(), json!(plan.matched_rules));
    metadata.insert(
        "steps".to_string(),
        serde_json::to_value(results).unwrap_or(Value::Null),
    );
    metadata.insert("matched_rules".to_string(), json!(policy.matched_ids()));
    metadata.insert(
        "validation".to_string(),
        validation
            .and_then(|validation| serde_json::to_value(validation).ok())
            .unwrap_or(Value::Null),
    );
    metadata.insert(
        "fallback".to_string(),
        json!({
            "recommended": decision.use_fallback,
            "reason": decision.reason,
            "validator_overridden": decision.validator_overridden,
            "error": fallback_error,
        }),
    );
    metadata
}
