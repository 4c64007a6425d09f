//! Record store contract and its backends.

mod memory_record_store;
mod sqlite_record_store;

pub use memory_record_store::MemoryRecordStore;
pub use sqlite_record_store::SqliteRecordStore;

use crate::models::{
    Api, Credential, CredentialKind, CredentialPatch, Endpoint, EndpointContext, Execution,
    ExecutionFilter, ExecutionWithInsights, Insight, InsightFilter, InsightSummary, NewCredential,
    NewExecution, NewInsight,
};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    MissingParent { entity: &'static str, id: String },
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence consumed by the engine. Implementations must keep the credential invariant:
/// at most one active credential per `(api_id, key)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces an API.
    async fn save_api(&self, api: Api) -> Result<Api, StoreError>;
    async fn get_api(&self, api_id: &str) -> Result<Option<Api>, StoreError>;
    /// Deletes an API with its endpoints, credentials, executions and insights.
    async fn delete_api(&self, api_id: &str) -> Result<bool, StoreError>;

    /// Inserts or replaces an endpoint. Fails with `MissingParent` when its API is absent.
    async fn save_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, StoreError>;
    async fn get_endpoint(&self, endpoint_id: &str) -> Result<Option<Endpoint>, StoreError>;
    /// Endpoints of an API in insertion order.
    async fn list_endpoints(&self, api_id: &str) -> Result<Vec<Endpoint>, StoreError>;
    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<bool, StoreError>;
    async fn endpoint_with_context(
        &self,
        endpoint_id: &str,
    ) -> Result<Option<EndpointContext>, StoreError>;

    /// Deactivates active credentials sharing `(api_id, key)`, then inserts the new one as active.
    async fn insert_credential(&self, credential: NewCredential) -> Result<Credential, StoreError>;
    /// Applies a patch. Re-activating a credential deactivates its active siblings.
    async fn update_credential(
        &self,
        credential_id: &str,
        patch: CredentialPatch,
    ) -> Result<Option<Credential>, StoreError>;
    async fn get_credential(&self, credential_id: &str) -> Result<Option<Credential>, StoreError>;
    async fn list_credentials(&self, api_id: &str) -> Result<Vec<Credential>, StoreError>;
    async fn active_credentials(
        &self,
        api_id: &str,
        kind: Option<CredentialKind>,
    ) -> Result<Vec<Credential>, StoreError>;
    async fn delete_credential(&self, credential_id: &str) -> Result<bool, StoreError>;

    async fn create_execution(&self, execution: NewExecution) -> Result<Execution, StoreError>;
    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<ExecutionWithInsights>, StoreError>;
    /// Newest first.
    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionWithInsights>, StoreError>;

    async fn create_insight(&self, insight: NewInsight) -> Result<Insight, StoreError>;
    /// Ordered as [`InsightFilter::ranks_by_confidence`] describes; ties go to the newest.
    async fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError>;
    async fn delete_insight(&self, insight_id: &str) -> Result<bool, StoreError>;
    async fn insight_summary(&self) -> Result<InsightSummary, StoreError>;
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
