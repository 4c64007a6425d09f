use crate::constants::network::{AUTH_FAILURE_STATUS, DEFAULT_FAILURE_STATUS};
use crate::errors::{EngineError, EngineErrorKind};
use crate::models::{EndpointContext, Execution, NewExecution};
use crate::services::credentials::{api_key_query, CredentialResolver};
use crate::services::http_transport::{HttpResponse, HttpTransport};
use crate::services::insights::{InsightJob, InsightTrigger};
use crate::services::logger::Logger;
use crate::services::request_builder::build_request;
use crate::stores::RecordStore;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub id: String,
    pub status_code: u16,
    pub response: Value,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub execution: ExecutionSummary,
}

impl From<&Execution> for ExecutionResult {
    fn from(execution: &Execution) -> Self {
        Self {
            success: execution.success,
            execution: ExecutionSummary {
                id: execution.id.clone(),
                status_code: execution.status_code,
                response: execution.response.clone(),
                error_message: execution.error_message.clone(),
            },
        }
    }
}

/// Runs one endpoint call end to end and persists exactly one execution record for it.
pub struct Executor {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<CredentialResolver>,
    insights: InsightTrigger,
    logger: Logger,
}

impl Executor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<CredentialResolver>,
        insights: InsightTrigger,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            transport,
            resolver,
            insights,
            logger: logger.child("executor"),
        }
    }

    pub async fn execute(
        &self,
        endpoint_id: &str,
        parameters: Map<String, Value>,
        model_key: &str,
    ) -> Result<ExecutionResult, EngineError> {
        let context = self
            .store
            .endpoint_with_context(endpoint_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Endpoint '{}' not found", endpoint_id)))?;
        self.execute_in_context(&context, parameters, model_key)
            .await
    }

    pub async fn execute_in_context(
        &self,
        context: &EndpointContext,
        parameters: Map<String, Value>,
        model_key: &str,
    ) -> Result<ExecutionResult, EngineError> {
        let endpoint = &context.endpoint;
        let started = Instant::now();
        let outcome = self.perform(context, &parameters).await;

        let record = match outcome {
            Ok(response) if response.is_success() => NewExecution {
                endpoint_id: endpoint.id.clone(),
                parameters: Value::Object(parameters),
                response: response.body,
                status_code: response.status,
                success: true,
                error_message: None,
            },
            Ok(response) => NewExecution {
                endpoint_id: endpoint.id.clone(),
                parameters: Value::Object(parameters),
                error_message: Some(format!(
                    "Request failed with status code {}",
                    response.status
                )),
                response: failure_body(response.body, None),
                status_code: response.status,
                success: false,
            },
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                let status_code = match err.kind {
                    EngineErrorKind::AuthenticationFailure => AUTH_FAILURE_STATUS,
                    _ => DEFAULT_FAILURE_STATUS,
                };
                NewExecution {
                    endpoint_id: endpoint.id.clone(),
                    parameters: Value::Object(parameters),
                    response: failure_body(Value::Null, Some(&err.message)),
                    status_code,
                    success: false,
                    error_message: Some(err.message),
                }
            }
        };

        let execution = self.store.create_execution(record).await?;
        let meta = json!({
            "execution_id": execution.id,
            "endpoint_id": endpoint.id,
            "method": endpoint.method.as_str(),
            "path": endpoint.path,
            "status": execution.status_code,
            "duration_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        if execution.success {
            self.logger.info("Endpoint executed", Some(&meta));
            self.insights.enqueue(InsightJob {
                execution_id: execution.id.clone(),
                endpoint: endpoint.clone(),
                response: execution.response.clone(),
                model_key: model_key.to_string(),
            });
        } else {
            self.logger.warn(
                &format!(
                    "Endpoint execution failed: {}",
                    execution.error_message.as_deref().unwrap_or("unknown error")
                ),
                Some(&meta),
            );
        }
        Ok(ExecutionResult::from(&execution))
    }

    async fn perform(
        &self,
        context: &EndpointContext,
        parameters: &Map<String, Value>,
    ) -> Result<HttpResponse, EngineError> {
        let credentials = self.resolver.decrypt_active(&context.credentials)?;
        let headers = self
            .resolver
            .build_headers(&context.api, context.endpoint.method, &credentials)
            .await?;
        let mut request = build_request(&context.api, &context.endpoint, headers, parameters)
            .map_err(|err| {
                let mut mapped = EngineError::remote_call(err.message);
                if let Some(hint) = err.hint {
                    mapped = mapped.with_hint(hint);
                }
                mapped
            })?;
        request.query.extend(api_key_query(&credentials));

        self.logger.debug(
            "Sending request",
            Some(&json!({
                "method": request.method.as_str(),
                "url": request.url,
                "headers": request.headers,
            })),
        );
        self.transport
            .send(request)
            .await
            .map_err(|err| EngineError::remote_call(err.to_string()))
    }
}

fn failure_body(body: Value, message: Option<&str>) -> Value {
    match (body, message) {
        (Value::Null, Some(message)) => json!({"error": message}),
        (Value::Null, None) => json!({}),
        (body, _) => body,
    }
}
