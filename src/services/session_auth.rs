use crate::constants::network::{TIMEOUT_SESSION_LOGIN_MS, USER_AGENT};
use crate::constants::session::{PASSWORD_KEY, TOKEN_TTL_MS, USERNAME_KEY};
use crate::errors::EngineError;
use crate::models::{Api, SessionConfig};
use crate::services::http_transport::{HttpTransport, RequestSpec};
use crate::services::logger::Logger;
use crate::services::request_builder::{build_endpoint_url, query_pairs};
use crate::utils::data_path::get_path_string;
use crate::utils::template::substitute_placeholders;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Per-API session token storage. Writes replace the whole entry.
pub trait TokenCache: Send + Sync {
    fn get(&self, api_id: &str) -> Option<CachedToken>;
    fn put(&self, api_id: &str, entry: CachedToken);
    fn invalidate(&self, api_id: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    entries: DashMap<String, CachedToken>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for InMemoryTokenCache {
    fn get(&self, api_id: &str) -> Option<CachedToken> {
        self.entries.get(api_id).map(|entry| entry.value().clone())
    }

    fn put(&self, api_id: &str, entry: CachedToken) {
        self.entries.insert(api_id.to_string(), entry);
    }

    fn invalidate(&self, api_id: &str) {
        self.entries.remove(api_id);
    }
}

/// Decrypted `username`/`password` pair of a session API.
#[derive(Clone)]
pub struct SessionCredentials {
    pub username: String,
    pub password: String,
}

impl SessionCredentials {
    /// Picks `username` and `password` out of decrypted `(key, value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<Self> {
        let mut username = None;
        let mut password = None;
        for (key, value) in pairs {
            if key == USERNAME_KEY {
                username = Some(value.to_string());
            } else if key == PASSWORD_KEY {
                password = Some(value.to_string());
            }
        }
        Some(Self {
            username: username?,
            password: password?,
        })
    }
}

/// Logs into session APIs and caches the returned token for 30 minutes.
pub struct SessionAuthenticator {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn TokenCache>,
    logger: Logger,
}

impl SessionAuthenticator {
    pub fn new(transport: Arc<dyn HttpTransport>, cache: Arc<dyn TokenCache>, logger: Logger) -> Self {
        Self {
            transport,
            cache,
            logger: logger.child("session"),
        }
    }

    pub fn cached_token(&self, api_id: &str) -> Option<String> {
        self.cache
            .get(api_id)
            .filter(|entry| entry.is_valid(Utc::now()))
            .map(|entry| entry.token)
    }

    pub fn invalidate(&self, api_id: &str) {
        self.cache.invalidate(api_id);
    }

    /// Returns a valid token, logging in when the cache has none. `None` means no cached token
    /// and no credentials to log in with.
    pub async fn token_for(
        &self,
        api: &Api,
        credentials: Option<&SessionCredentials>,
    ) -> Result<Option<String>, EngineError> {
        if let Some(token) = self.cached_token(&api.id) {
            return Ok(Some(token));
        }
        let config = session_config(api)?;
        match credentials {
            Some(credentials) => self.login(api, config, credentials).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn login(
        &self,
        api: &Api,
        config: &SessionConfig,
        credentials: &SessionCredentials,
    ) -> Result<String, EngineError> {
        let url = build_endpoint_url(&api.base_url, &config.auth_endpoint).map_err(|err| {
            EngineError::authentication(format!("Session login failed: {}", err.message))
        })?;
        let values = HashMap::from([
            (USERNAME_KEY, credentials.username.as_str()),
            (PASSWORD_KEY, credentials.password.as_str()),
        ]);
        let payload = substitute_placeholders(&config.auth_payload, &values);

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
        let (query, body) = if config.auth_method.carries_body() {
            (Vec::new(), Some(payload))
        } else {
            (
                payload.as_object().map(query_pairs).unwrap_or_default(),
                None,
            )
        };
        let request = RequestSpec {
            method: config.auth_method,
            url,
            headers,
            query,
            body,
            timeout: Duration::from_millis(TIMEOUT_SESSION_LOGIN_MS),
        };

        self.logger.debug(
            "Session login",
            Some(&json!({"api_id": api.id, "url": request.url, "method": request.method.as_str()})),
        );
        let response = self.transport.send(request).await.map_err(|err| {
            EngineError::authentication(format!("Session login failed: {}", err))
        })?;
        if !response.is_success() {
            return Err(EngineError::authentication(format!(
                "Session login failed with status {}",
                response.status
            ))
            .with_details(json!({"status": response.status})));
        }

        let token = extract_token(&response.body, &config.token_path)?;
        self.cache.put(
            &api.id,
            CachedToken {
                token: token.clone(),
                expires_at: Utc::now() + ChronoDuration::milliseconds(TOKEN_TTL_MS),
            },
        );
        self.logger
            .info("Session token refreshed", Some(&json!({"api_id": api.id})));
        Ok(token)
    }
}

pub fn session_config(api: &Api) -> Result<&SessionConfig, EngineError> {
    api.session.as_ref().ok_or_else(|| {
        EngineError::authentication(format!(
            "API '{}' uses session auth but has no session configuration",
            api.name
        ))
    })
}

/// Reads the token at a dot path. Missing segments and non-string values are failures.
pub fn extract_token(body: &Value, token_path: &str) -> Result<String, EngineError> {
    get_path_string(body, token_path).ok_or_else(|| {
        EngineError::authentication(format!(
            "Token not found in login response at path '{}'",
            token_path
        ))
    })
}
