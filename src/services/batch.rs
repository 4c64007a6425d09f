use crate::collaborators::ParameterGenerator;
use crate::constants::batch::BATCH_SIZE;
use crate::errors::EngineError;
use crate::models::{Credential, EndpointContext};
use crate::services::executor::{ExecutionResult, Executor};
use crate::services::logger::Logger;
use crate::stores::RecordStore;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOutcome {
    Fulfilled { data: ExecutionResult },
    Rejected { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub endpoint: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchEntry {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Fulfilled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub message: String,
    pub results: Vec<BatchEntry>,
}

/// Executes every endpoint of an API, `BATCH_SIZE` at a time.
pub struct BatchDispatcher {
    store: Arc<dyn RecordStore>,
    executor: Arc<Executor>,
    parameters: Arc<dyn ParameterGenerator>,
    logger: Logger,
}

impl BatchDispatcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        executor: Arc<Executor>,
        parameters: Arc<dyn ParameterGenerator>,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            executor,
            parameters,
            logger: logger.child("batch"),
        }
    }

    pub async fn execute_all(&self, api_id: &str, model_key: &str) -> Result<BatchReport, EngineError> {
        let api = self
            .store
            .get_api(api_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("API '{}' not found", api_id)))?;
        let endpoints = self.store.list_endpoints(api_id).await?;
        if endpoints.is_empty() {
            return Err(EngineError::not_found(format!(
                "API '{}' has no endpoints",
                api.name
            )));
        }
        let credentials: Vec<Credential> = self.store.active_credentials(api_id, None).await?;
        let api_context = api.context_text();

        let total = endpoints.len();
        let mut results = Vec::with_capacity(total);
        for (index, chunk) in endpoints.chunks(BATCH_SIZE).enumerate() {
            self.logger.info(
                "Dispatching batch",
                Some(&json!({"api_id": api_id, "batch": index + 1, "size": chunk.len()})),
            );
            let tasks = chunk.iter().map(|endpoint| {
                let context = EndpointContext {
                    endpoint: endpoint.clone(),
                    api: api.clone(),
                    credentials: credentials.clone(),
                };
                let api_context = api_context.as_str();
                async move {
                    let outcome = self.dispatch_one(&context, api_context, model_key).await;
                    (context.endpoint.path, outcome)
                }
            });
            for (path, outcome) in join_all(tasks).await {
                let outcome = match outcome {
                    Ok(data) => BatchOutcome::Fulfilled { data },
                    Err(err) => {
                        self.logger.warn(
                            "Endpoint rejected in batch",
                            Some(&json!({"api_id": api_id, "endpoint": path, "error": err.message})),
                        );
                        BatchOutcome::Rejected { error: err.message }
                    }
                };
                results.push(BatchEntry {
                    endpoint: path,
                    outcome,
                });
            }
        }

        Ok(BatchReport {
            success: true,
            message: format!("Executed {} endpoints", total),
            results,
        })
    }

    async fn dispatch_one(
        &self,
        context: &EndpointContext,
        api_context: &str,
        model_key: &str,
    ) -> Result<ExecutionResult, EngineError> {
        let generated = self
            .parameters
            .generate_parameters(&context.endpoint, api_context, model_key)
            .await?;
        self.executor
            .execute_in_context(context, generated.as_json_map(), model_key)
            .await
    }
}
