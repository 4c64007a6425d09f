use crate::collaborators::{InsightGenerator, ParameterGenerator};
use crate::constants::history::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::constants::models::DEFAULT_MODEL_KEY;
use crate::errors::EngineError;
use crate::models::{
    Api, ApiPatch, AuthType, CredentialView, Endpoint, ExecutionFilter, ExecutionWithInsights,
    Insight, InsightFilter, InsightSummary,
};
use crate::services::batch::{BatchDispatcher, BatchReport};
use crate::services::credentials::{CredentialResolver, CredentialService, MissingSessionCredentials};
use crate::services::executor::{ExecutionResult, Executor};
use crate::services::http_transport::HttpTransport;
use crate::services::insights::{InsightStats, InsightTrigger};
use crate::services::logger::Logger;
use crate::services::secrets::SecretCipher;
use crate::services::session_auth::{InMemoryTokenCache, SessionAuthenticator, TokenCache};
use crate::stores::RecordStore;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Collaborators an [`Engine`] is assembled from.
pub struct EngineParts {
    pub store: Arc<dyn RecordStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub cipher: Arc<SecretCipher>,
    pub parameters: Arc<dyn ParameterGenerator>,
    pub insights: Arc<dyn InsightGenerator>,
    pub token_cache: Arc<dyn TokenCache>,
    pub missing_session: MissingSessionCredentials,
    pub default_model_key: String,
    pub logger: Logger,
}

impl EngineParts {
    pub fn new(
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn HttpTransport>,
        cipher: Arc<SecretCipher>,
        parameters: Arc<dyn ParameterGenerator>,
        insights: Arc<dyn InsightGenerator>,
    ) -> Self {
        Self {
            store,
            transport,
            cipher,
            parameters,
            insights,
            token_cache: Arc::new(InMemoryTokenCache::new()),
            missing_session: MissingSessionCredentials::default(),
            default_model_key: DEFAULT_MODEL_KEY.to_string(),
            logger: Logger::new("apirunner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSuggestion {
    pub success: bool,
    pub parameters: BTreeMap<String, String>,
    pub explanation: String,
}

/// Entry point for executing endpoints, managing credentials and reading history.
pub struct Engine {
    store: Arc<dyn RecordStore>,
    executor: Arc<Executor>,
    batch: BatchDispatcher,
    parameters: Arc<dyn ParameterGenerator>,
    credentials: CredentialService,
    sessions: Arc<SessionAuthenticator>,
    insights: InsightTrigger,
    default_model_key: String,
    logger: Logger,
}

impl Engine {
    /// Wires the services together and starts the insight worker. Needs a tokio runtime.
    pub fn new(parts: EngineParts) -> Self {
        let logger = parts.logger;
        let sessions = Arc::new(SessionAuthenticator::new(
            parts.transport.clone(),
            parts.token_cache,
            logger.clone(),
        ));
        let resolver = Arc::new(
            CredentialResolver::new(parts.cipher.clone(), sessions.clone(), logger.clone())
                .with_missing_session_policy(parts.missing_session),
        );
        let insights = InsightTrigger::spawn(parts.insights, parts.store.clone(), logger.clone());
        let executor = Arc::new(Executor::new(
            parts.store.clone(),
            parts.transport,
            resolver,
            insights.clone(),
            logger.clone(),
        ));
        let batch = BatchDispatcher::new(
            parts.store.clone(),
            executor.clone(),
            parts.parameters.clone(),
            logger.clone(),
        );
        let credentials = CredentialService::new(parts.store.clone(), parts.cipher, logger.clone());
        Self {
            store: parts.store,
            executor,
            batch,
            parameters: parts.parameters,
            credentials,
            sessions,
            insights,
            default_model_key: parts.default_model_key,
            logger: logger.child("engine"),
        }
    }

    fn model_key<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .unwrap_or(&self.default_model_key)
    }

    pub fn insight_stats(&self) -> InsightStats {
        self.insights.stats()
    }

    /// Log counters shared by every component logger.
    pub fn log_stats(&self) -> Value {
        self.logger.stats()
    }

    pub fn insights(&self) -> &InsightTrigger {
        &self.insights
    }

    pub async fn execute(
        &self,
        endpoint_id: &str,
        parameters: Map<String, Value>,
        model_key: Option<&str>,
    ) -> Result<ExecutionResult, EngineError> {
        self.executor
            .execute(endpoint_id, parameters, self.model_key(model_key))
            .await
    }

    pub async fn execute_all(
        &self,
        api_id: &str,
        model_key: Option<&str>,
    ) -> Result<BatchReport, EngineError> {
        self.batch
            .execute_all(api_id, self.model_key(model_key))
            .await
    }

    pub async fn generate_parameters_for(
        &self,
        endpoint_id: &str,
        model_key: Option<&str>,
    ) -> Result<ParameterSuggestion, EngineError> {
        let context = self
            .store
            .endpoint_with_context(endpoint_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Endpoint '{}' not found", endpoint_id)))?;
        let generated = self
            .parameters
            .generate_parameters(
                &context.endpoint,
                &context.api.context_text(),
                self.model_key(model_key),
            )
            .await?;
        self.logger.debug(
            "Parameters generated",
            Some(&json!({"endpoint_id": endpoint_id, "count": generated.parameters.len()})),
        );
        Ok(ParameterSuggestion {
            success: true,
            parameters: generated.parameters,
            explanation: generated.explanation,
        })
    }

    pub async fn create_credential(
        &self,
        api_id: &str,
        kind: &str,
        key: &str,
        value: &str,
        metadata: Option<Value>,
    ) -> Result<CredentialView, EngineError> {
        let view = self
            .credentials
            .create(api_id, kind, key, value, metadata)
            .await?;
        self.sessions.invalidate(api_id);
        Ok(view)
    }

    pub async fn list_credentials(&self, api_id: &str) -> Result<Vec<CredentialView>, EngineError> {
        self.credentials.list(api_id).await
    }

    pub async fn update_credential(
        &self,
        credential_id: &str,
        value: Option<&str>,
        is_active: Option<bool>,
        metadata: Option<Value>,
    ) -> Result<CredentialView, EngineError> {
        let view = self
            .credentials
            .update(credential_id, value, is_active, metadata)
            .await?;
        self.sessions.invalidate(&view.api_id);
        Ok(view)
    }

    pub async fn delete_credential(&self, credential_id: &str) -> Result<(), EngineError> {
        let existing = self.store.get_credential(credential_id).await?;
        self.credentials.delete(credential_id).await?;
        if let Some(credential) = existing {
            self.sessions.invalidate(&credential.api_id);
        }
        Ok(())
    }

    pub async fn list_executions(
        &self,
        mut filter: ExecutionFilter,
    ) -> Result<Vec<ExecutionWithInsights>, EngineError> {
        filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
        Ok(self.store.list_executions(&filter).await?)
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<ExecutionWithInsights, EngineError> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Execution '{}' not found", execution_id)))
    }

    pub async fn get_api(&self, api_id: &str) -> Result<Api, EngineError> {
        self.store
            .get_api(api_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("API '{}' not found", api_id)))
    }

    /// Patches an API and drops its cached session token.
    pub async fn update_api(&self, api_id: &str, patch: ApiPatch) -> Result<Api, EngineError> {
        let mut api = self.get_api(api_id).await?;
        api.apply(patch);
        if api.name.trim().is_empty() {
            return Err(EngineError::invalid_params("name must not be empty"));
        }
        if api.base_url.trim().is_empty() {
            return Err(EngineError::invalid_params("baseUrl must not be empty"));
        }
        if api.auth_type == AuthType::Session && api.session.is_none() {
            return Err(EngineError::invalid_params(
                "session auth needs a session configuration",
            ));
        }
        let saved = self.store.save_api(api).await?;
        self.sessions.invalidate(api_id);
        self.logger.info(
            "API updated",
            Some(&json!({"api_id": api_id, "auth_type": saved.auth_type.as_str()})),
        );
        Ok(saved)
    }

    /// Deletes an API together with its endpoints, credentials, executions and insights.
    pub async fn delete_api(&self, api_id: &str) -> Result<(), EngineError> {
        if !self.store.delete_api(api_id).await? {
            return Err(EngineError::not_found(format!("API '{}' not found", api_id)));
        }
        self.sessions.invalidate(api_id);
        self.logger.info("API deleted", Some(&json!({"api_id": api_id})));
        Ok(())
    }

    pub async fn list_endpoints(&self, api_id: &str) -> Result<Vec<Endpoint>, EngineError> {
        self.get_api(api_id).await?;
        Ok(self.store.list_endpoints(api_id).await?)
    }

    pub async fn list_insights(&self, mut filter: InsightFilter) -> Result<Vec<Insight>, EngineError> {
        filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
        Ok(self.store.list_insights(&filter).await?)
    }

    pub async fn delete_insight(&self, insight_id: &str) -> Result<(), EngineError> {
        if !self.store.delete_insight(insight_id).await? {
            return Err(EngineError::not_found(format!(
                "Insight '{}' not found",
                insight_id
            )));
        }
        Ok(())
    }

    /// Totals over stored insights, unlike [`Engine::insight_stats`] which counts worker jobs.
    pub async fn insight_summary(&self) -> Result<InsightSummary, EngineError> {
        Ok(self.store.insight_summary().await?)
    }
}
