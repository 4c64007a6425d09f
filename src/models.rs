//! Records the engine reads and writes through the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST, PUT and PATCH carry parameters as a JSON body; GET and DELETE use the query string.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ParseEnumError {
                kind: "http method",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    ApiKey,
    Bearer,
    Basic,
    Session,
    Custom,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::ApiKey => "apikey",
            AuthType::Bearer => "bearer",
            AuthType::Basic => "basic",
            AuthType::Session => "session",
            AuthType::Custom => "custom",
        }
    }
}

impl FromStr for AuthType {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "apikey" => Ok(AuthType::ApiKey),
            "bearer" => Ok(AuthType::Bearer),
            "basic" => Ok(AuthType::Basic),
            "session" => Ok(AuthType::Session),
            "custom" => Ok(AuthType::Custom),
            _ => Err(ParseEnumError {
                kind: "auth type",
                value: raw.to_string(),
            }),
        }
    }
}

/// Kind of a stored credential. Unknown labels parse as `Custom`, which contributes a header
/// named by the credential key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    ApiKey,
    Bearer,
    Basic,
    Session,
    Custom,
}

impl CredentialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::ApiKey => "apikey",
            CredentialKind::Bearer => "bearer",
            CredentialKind::Basic => "basic",
            CredentialKind::Session => "session",
            CredentialKind::Custom => "custom",
        }
    }

    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "apikey" => CredentialKind::ApiKey,
            "bearer" => CredentialKind::Bearer,
            "basic" => CredentialKind::Basic,
            "session" => CredentialKind::Session,
            _ => CredentialKind::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Trend,
    Anomaly,
    Opportunity,
    Risk,
}

impl InsightCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightCategory::Trend => "trend",
            InsightCategory::Anomaly => "anomaly",
            InsightCategory::Opportunity => "opportunity",
            InsightCategory::Risk => "risk",
        }
    }
}

impl FromStr for InsightCategory {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "trend" => Ok(InsightCategory::Trend),
            "anomaly" => Ok(InsightCategory::Anomaly),
            "opportunity" => Ok(InsightCategory::Opportunity),
            "risk" => Ok(InsightCategory::Risk),
            _ => Err(ParseEnumError {
                kind: "insight category",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointParameters {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub api_id: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub parameters: EndpointParameters,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_token_header() -> String {
    crate::constants::session::DEFAULT_TOKEN_HEADER.to_string()
}

fn default_auth_method() -> HttpMethod {
    HttpMethod::Post
}

/// Login handshake settings for `AuthType::Session` APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub auth_endpoint: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: HttpMethod,
    pub auth_payload: Value,
    pub token_path: String,
    #[serde(default = "default_token_header")]
    pub token_header: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub auth_type: AuthType,
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

impl Api {
    /// Context block handed to the parameter collaborator.
    pub fn context_text(&self) -> String {
        format!(
            "API: {}\nURL Base: {}\nDescription: {}\nAuthentication: {}\n",
            self.name,
            self.base_url,
            self.description.as_deref().unwrap_or("Not specified"),
            self.auth_type.as_str()
        )
    }

    /// Applies the fields a patch carries.
    pub fn apply(&mut self, patch: ApiPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(base_url) = patch.base_url {
            self.base_url = base_url;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(auth_type) = patch.auth_type {
            self.auth_type = auth_type;
        }
        if let Some(session) = patch.session {
            self.session = Some(session);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiPatch {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub description: Option<String>,
    pub auth_type: Option<AuthType>,
    pub session: Option<SessionConfig>,
}

/// A stored credential. `value` holds the encrypted secret as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub api_id: String,
    pub kind: CredentialKind,
    pub key: String,
    pub value: String,
    pub is_active: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn view(&self) -> CredentialView {
        CredentialView {
            id: self.id.clone(),
            api_id: self.api_id.clone(),
            kind: self.kind,
            key: self.key.clone(),
            is_active: self.is_active,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Credential without its secret, safe to hand out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialView {
    pub id: String,
    pub api_id: String,
    pub kind: CredentialKind,
    pub key: String,
    pub is_active: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub api_id: String,
    pub kind: CredentialKind,
    pub key: String,
    pub value: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub value: Option<String>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub endpoint_id: String,
    pub parameters: Value,
    pub response: Value,
    pub status_code: u16,
    pub success: bool,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExecution {
    pub endpoint_id: String,
    pub parameters: Value,
    pub response: Value,
    pub status_code: u16,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub execution_id: String,
    pub ai_model: String,
    pub title: String,
    pub description: String,
    pub category: InsightCategory,
    pub confidence: u8,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInsight {
    pub execution_id: String,
    pub ai_model: String,
    pub title: String,
    pub description: String,
    pub category: InsightCategory,
    pub confidence: u8,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionWithInsights {
    #[serde(flatten)]
    pub execution: Execution,
    pub insights: Vec<Insight>,
}

/// Endpoint joined with its API and the API's active credentials.
#[derive(Debug, Clone)]
pub struct EndpointContext {
    pub endpoint: Endpoint,
    pub api: Api,
    pub credentials: Vec<Credential>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub endpoint_id: Option<String>,
    pub api_id: Option<String>,
    pub limit: Option<usize>,
}

/// Insight listing filter. Filtered listings are ordered by confidence, unfiltered ones newest
/// first.
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    pub execution_id: Option<String>,
    pub category: Option<InsightCategory>,
    pub limit: Option<usize>,
}

impl InsightFilter {
    pub fn ranks_by_confidence(&self) -> bool {
        self.execution_id.is_some() || self.category.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: InsightCategory,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCount {
    pub model: String,
    pub count: u64,
}

/// Aggregate view over every stored insight.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSummary {
    pub total: u64,
    pub by_category: Vec<CategoryCount>,
    pub by_model: Vec<ModelCount>,
    pub average_confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_kind_falls_back_to_custom() {
        assert_eq!(CredentialKind::from_label("APIKEY"), CredentialKind::ApiKey);
        assert_eq!(CredentialKind::from_label("x-token"), CredentialKind::Custom);
    }

    #[test]
    fn session_config_defaults_header_and_method() {
        let raw = serde_json::json!({
            "authEndpoint": "/login",
            "authPayload": {"user": "{username}"},
            "tokenPath": "data.token"
        });
        let parsed: SessionConfig = serde_json::from_value(raw).expect("session config");
        assert_eq!(parsed.auth_method, HttpMethod::Post);
        assert_eq!(parsed.token_header, "Authorization");
    }

    #[test]
    fn http_method_body_switch() {
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
        assert_eq!("delete".parse::<HttpMethod>().expect("method"), HttpMethod::Delete);
    }
}
