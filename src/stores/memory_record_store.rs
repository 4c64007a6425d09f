use crate::constants::history::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::models::{
    Api, CategoryCount, Credential, CredentialKind, CredentialPatch, Endpoint, EndpointContext,
    Execution, ExecutionFilter, ExecutionWithInsights, Insight, InsightFilter, InsightSummary,
    ModelCount, NewCredential, NewExecution, NewInsight,
};
use crate::stores::{new_record_id, RecordStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    apis: HashMap<String, Api>,
    endpoints: Vec<Endpoint>,
    credentials: Vec<Credential>,
    executions: Vec<Execution>,
    insights: Vec<Insight>,
}

impl Tables {
    fn insights_for(&self, execution_id: &str) -> Vec<Insight> {
        self.insights
            .iter()
            .filter(|insight| insight.execution_id == execution_id)
            .cloned()
            .collect()
    }

    fn drop_executions(&mut self, endpoint_ids: &HashSet<String>) {
        let removed: HashSet<String> = self
            .executions
            .iter()
            .filter(|execution| endpoint_ids.contains(&execution.endpoint_id))
            .map(|execution| execution.id.clone())
            .collect();
        self.executions
            .retain(|execution| !removed.contains(&execution.id));
        self.insights
            .retain(|insight| !removed.contains(&insight.execution_id));
    }

    fn deactivate_siblings(&mut self, api_id: &str, key: &str, keep_id: Option<&str>) {
        let now = chrono::Utc::now();
        for credential in self.credentials.iter_mut() {
            if credential.api_id == api_id
                && credential.key == key
                && credential.is_active
                && Some(credential.id.as_str()) != keep_id
            {
                credential.is_active = false;
                credential.updated_at = now;
            }
        }
    }
}

/// Process-local record store. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save_api(&self, api: Api) -> Result<Api, StoreError> {
        self.write()?.apis.insert(api.id.clone(), api.clone());
        Ok(api)
    }

    async fn get_api(&self, api_id: &str) -> Result<Option<Api>, StoreError> {
        Ok(self.read()?.apis.get(api_id).cloned())
    }

    async fn delete_api(&self, api_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        if tables.apis.remove(api_id).is_none() {
            return Ok(false);
        }
        let endpoint_ids: HashSet<String> = tables
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.api_id == api_id)
            .map(|endpoint| endpoint.id.clone())
            .collect();
        tables.drop_executions(&endpoint_ids);
        tables.endpoints.retain(|endpoint| endpoint.api_id != api_id);
        tables
            .credentials
            .retain(|credential| credential.api_id != api_id);
        Ok(true)
    }

    async fn save_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, StoreError> {
        let mut tables = self.write()?;
        if !tables.apis.contains_key(&endpoint.api_id) {
            return Err(StoreError::MissingParent {
                entity: "API",
                id: endpoint.api_id.clone(),
            });
        }
        match tables.endpoints.iter().position(|e| e.id == endpoint.id) {
            Some(index) => tables.endpoints[index] = endpoint.clone(),
            None => tables.endpoints.push(endpoint.clone()),
        }
        Ok(endpoint)
    }

    async fn get_endpoint(&self, endpoint_id: &str) -> Result<Option<Endpoint>, StoreError> {
        Ok(self
            .read()?
            .endpoints
            .iter()
            .find(|endpoint| endpoint.id == endpoint_id)
            .cloned())
    }

    async fn list_endpoints(&self, api_id: &str) -> Result<Vec<Endpoint>, StoreError> {
        Ok(self
            .read()?
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.api_id == api_id)
            .cloned()
            .collect())
    }

    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let before = tables.endpoints.len();
        tables.endpoints.retain(|endpoint| endpoint.id != endpoint_id);
        if tables.endpoints.len() == before {
            return Ok(false);
        }
        tables.drop_executions(&HashSet::from([endpoint_id.to_string()]));
        Ok(true)
    }

    async fn endpoint_with_context(
        &self,
        endpoint_id: &str,
    ) -> Result<Option<EndpointContext>, StoreError> {
        let tables = self.read()?;
        let Some(endpoint) = tables.endpoints.iter().find(|e| e.id == endpoint_id) else {
            return Ok(None);
        };
        let Some(api) = tables.apis.get(&endpoint.api_id) else {
            return Ok(None);
        };
        let credentials = tables
            .credentials
            .iter()
            .filter(|credential| credential.api_id == api.id && credential.is_active)
            .cloned()
            .collect();
        Ok(Some(EndpointContext {
            endpoint: endpoint.clone(),
            api: api.clone(),
            credentials,
        }))
    }

    async fn insert_credential(&self, credential: NewCredential) -> Result<Credential, StoreError> {
        let mut tables = self.write()?;
        if !tables.apis.contains_key(&credential.api_id) {
            return Err(StoreError::MissingParent {
                entity: "API",
                id: credential.api_id.clone(),
            });
        }
        tables.deactivate_siblings(&credential.api_id, &credential.key, None);
        let now = chrono::Utc::now();
        let record = Credential {
            id: new_record_id(),
            api_id: credential.api_id,
            kind: credential.kind,
            key: credential.key,
            value: credential.value,
            is_active: true,
            metadata: credential.metadata,
            created_at: now,
            updated_at: now,
        };
        tables.credentials.push(record.clone());
        Ok(record)
    }

    async fn update_credential(
        &self,
        credential_id: &str,
        patch: CredentialPatch,
    ) -> Result<Option<Credential>, StoreError> {
        let mut tables = self.write()?;
        let Some(index) = tables
            .credentials
            .iter()
            .position(|credential| credential.id == credential_id)
        else {
            return Ok(None);
        };
        if patch.is_active == Some(true) {
            let (api_id, key) = {
                let current = &tables.credentials[index];
                (current.api_id.clone(), current.key.clone())
            };
            tables.deactivate_siblings(&api_id, &key, Some(credential_id));
        }
        let credential = &mut tables.credentials[index];
        if let Some(value) = patch.value {
            credential.value = value;
        }
        if let Some(is_active) = patch.is_active {
            credential.is_active = is_active;
        }
        if let Some(metadata) = patch.metadata {
            credential.metadata = metadata;
        }
        credential.updated_at = chrono::Utc::now();
        Ok(Some(credential.clone()))
    }

    async fn get_credential(&self, credential_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .read()?
            .credentials
            .iter()
            .find(|credential| credential.id == credential_id)
            .cloned())
    }

    async fn list_credentials(&self, api_id: &str) -> Result<Vec<Credential>, StoreError> {
        Ok(self
            .read()?
            .credentials
            .iter()
            .filter(|credential| credential.api_id == api_id)
            .cloned()
            .collect())
    }

    async fn active_credentials(
        &self,
        api_id: &str,
        kind: Option<CredentialKind>,
    ) -> Result<Vec<Credential>, StoreError> {
        Ok(self
            .read()?
            .credentials
            .iter()
            .filter(|credential| {
                credential.api_id == api_id
                    && credential.is_active
                    && kind.map_or(true, |kind| credential.kind == kind)
            })
            .cloned()
            .collect())
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let before = tables.credentials.len();
        tables
            .credentials
            .retain(|credential| credential.id != credential_id);
        Ok(tables.credentials.len() != before)
    }

    async fn create_execution(&self, execution: NewExecution) -> Result<Execution, StoreError> {
        let mut tables = self.write()?;
        if !tables.endpoints.iter().any(|e| e.id == execution.endpoint_id) {
            return Err(StoreError::MissingParent {
                entity: "Endpoint",
                id: execution.endpoint_id.clone(),
            });
        }
        let record = Execution {
            id: new_record_id(),
            endpoint_id: execution.endpoint_id,
            parameters: execution.parameters,
            response: execution.response,
            status_code: execution.status_code,
            success: execution.success,
            error_message: execution.error_message,
            executed_at: chrono::Utc::now(),
        };
        tables.executions.push(record.clone());
        Ok(record)
    }

    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<ExecutionWithInsights>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .executions
            .iter()
            .find(|execution| execution.id == execution_id)
            .map(|execution| ExecutionWithInsights {
                execution: execution.clone(),
                insights: tables.insights_for(&execution.id),
            }))
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionWithInsights>, StoreError> {
        let tables = self.read()?;
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let api_endpoints: Option<HashSet<&str>> = filter.api_id.as_deref().map(|api_id| {
            tables
                .endpoints
                .iter()
                .filter(|endpoint| endpoint.api_id == api_id)
                .map(|endpoint| endpoint.id.as_str())
                .collect()
        });
        Ok(tables
            .executions
            .iter()
            .rev()
            .filter(|execution| {
                filter
                    .endpoint_id
                    .as_deref()
                    .map_or(true, |id| execution.endpoint_id == id)
            })
            .filter(|execution| {
                api_endpoints
                    .as_ref()
                    .map_or(true, |ids| ids.contains(execution.endpoint_id.as_str()))
            })
            .take(limit)
            .map(|execution| ExecutionWithInsights {
                execution: execution.clone(),
                insights: tables.insights_for(&execution.id),
            })
            .collect())
    }

    async fn create_insight(&self, insight: NewInsight) -> Result<Insight, StoreError> {
        let mut tables = self.write()?;
        if !tables.executions.iter().any(|e| e.id == insight.execution_id) {
            return Err(StoreError::MissingParent {
                entity: "Execution",
                id: insight.execution_id.clone(),
            });
        }
        let record = Insight {
            id: new_record_id(),
            execution_id: insight.execution_id,
            ai_model: insight.ai_model,
            title: insight.title,
            description: insight.description,
            category: insight.category,
            confidence: insight.confidence.min(100),
            metadata: insight.metadata,
            created_at: chrono::Utc::now(),
        };
        tables.insights.push(record.clone());
        Ok(record)
    }

    async fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError> {
        let tables = self.read()?;
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let mut insights: Vec<Insight> = tables
            .insights
            .iter()
            .rev()
            .filter(|insight| {
                filter
                    .execution_id
                    .as_deref()
                    .map_or(true, |id| insight.execution_id == id)
            })
            .filter(|insight| filter.category.map_or(true, |c| insight.category == c))
            .cloned()
            .collect();
        if filter.ranks_by_confidence() {
            insights.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        }
        insights.truncate(limit);
        Ok(insights)
    }

    async fn delete_insight(&self, insight_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let before = tables.insights.len();
        tables.insights.retain(|insight| insight.id != insight_id);
        Ok(tables.insights.len() != before)
    }

    async fn insight_summary(&self) -> Result<InsightSummary, StoreError> {
        let tables = self.read()?;
        let mut by_category = BTreeMap::new();
        let mut by_model: BTreeMap<&str, u64> = BTreeMap::new();
        let mut confidence_sum = 0u64;
        for insight in &tables.insights {
            by_category
                .entry(insight.category.as_str())
                .or_insert((insight.category, 0u64))
                .1 += 1;
            *by_model.entry(insight.ai_model.as_str()).or_default() += 1;
            confidence_sum += u64::from(insight.confidence);
        }
        let total = tables.insights.len() as u64;
        Ok(InsightSummary {
            total,
            by_category: by_category
                .into_values()
                .map(|(category, count)| CategoryCount { category, count })
                .collect(),
            by_model: by_model
                .into_iter()
                .map(|(model, count)| ModelCount {
                    model: model.to_string(),
                    count,
                })
                .collect(),
            average_confidence: (total > 0).then(|| confidence_sum as f64 / total as f64),
        })
    }
}
