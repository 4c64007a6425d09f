use crate::constants::network::USER_AGENT;
use crate::errors::EngineError;
use crate::models::{
    Api, AuthType, Credential, CredentialKind, CredentialPatch, CredentialView, HttpMethod,
    NewCredential,
};
use crate::services::logger::Logger;
use crate::services::secrets::SecretCipher;
use crate::services::session_auth::{session_config, SessionAuthenticator, SessionCredentials};
use crate::stores::RecordStore;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What to do when a session API lacks an active username/password pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSessionCredentials {
    /// Send the request without a session token and log a warning.
    #[default]
    ProceedUnauthenticated,
    /// Record the call as an authentication failure without sending it.
    Fail,
}

impl MissingSessionCredentials {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "proceed" | "warn" => Some(Self::ProceedUnauthenticated),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// A credential with its secret decrypted.
#[derive(Clone)]
pub struct ResolvedCredential {
    pub kind: CredentialKind,
    pub key: String,
    pub value: String,
}

/// Headers contributed by static credentials. `apikey` and `session` credentials never produce
/// headers.
pub fn credential_headers(
    method: HttpMethod,
    credentials: &[ResolvedCredential],
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
    if method.carries_body() {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    for credential in credentials {
        match credential.kind {
            CredentialKind::ApiKey | CredentialKind::Session => {}
            CredentialKind::Bearer => {
                headers.insert(
                    "Authorization".to_string(),
                    format!("Bearer {}", credential.value),
                );
            }
            CredentialKind::Basic => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(credential.value.as_bytes());
                headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
            }
            CredentialKind::Custom => {
                headers.insert(credential.key.clone(), credential.value.clone());
            }
        }
    }
    headers
}

/// `apikey` credentials as query pairs.
pub fn api_key_query(credentials: &[ResolvedCredential]) -> Vec<(String, String)> {
    credentials
        .iter()
        .filter(|credential| credential.kind == CredentialKind::ApiKey)
        .map(|credential| (credential.key.clone(), credential.value.clone()))
        .collect()
}

/// Formats a session token for its header. `Authorization` gets a `Bearer` prefix unless the
/// token already carries one.
pub fn session_header_value(header: &str, token: &str) -> String {
    if header.eq_ignore_ascii_case("authorization") && !token.to_lowercase().starts_with("bearer ")
    {
        format!("Bearer {}", token)
    } else {
        token.to_string()
    }
}

pub struct CredentialResolver {
    cipher: Arc<SecretCipher>,
    sessions: Arc<SessionAuthenticator>,
    missing_session: MissingSessionCredentials,
    logger: Logger,
}

impl CredentialResolver {
    pub fn new(cipher: Arc<SecretCipher>, sessions: Arc<SessionAuthenticator>, logger: Logger) -> Self {
        Self {
            cipher,
            sessions,
            missing_session: MissingSessionCredentials::default(),
            logger: logger.child("credentials"),
        }
    }

    pub fn with_missing_session_policy(mut self, policy: MissingSessionCredentials) -> Self {
        self.missing_session = policy;
        self
    }

    /// Decrypts the active credentials of an API.
    pub fn decrypt_active(
        &self,
        credentials: &[Credential],
    ) -> Result<Vec<ResolvedCredential>, EngineError> {
        credentials
            .iter()
            .filter(|credential| credential.is_active)
            .map(|credential| -> Result<ResolvedCredential, EngineError> {
                let value = self.cipher.decrypt(&credential.value).map_err(|err| {
                    let mut mapped = EngineError::authentication(format!(
                        "Credential '{}' could not be decrypted: {}",
                        credential.key, err.message
                    ));
                    if let Some(hint) = err.hint {
                        mapped = mapped.with_hint(hint);
                    }
                    mapped
                })?;
                Ok(ResolvedCredential {
                    kind: credential.kind,
                    key: credential.key.clone(),
                    value,
                })
            })
            .collect()
    }

    /// Full header map for a call, including the session token for session APIs.
    pub async fn build_headers(
        &self,
        api: &Api,
        method: HttpMethod,
        credentials: &[ResolvedCredential],
    ) -> Result<BTreeMap<String, String>, EngineError> {
        let mut headers = credential_headers(method, credentials);
        if api.auth_type != AuthType::Session {
            return Ok(headers);
        }

        let config = session_config(api)?;
        let session_credentials = SessionCredentials::from_pairs(
            credentials
                .iter()
                .filter(|credential| credential.kind == CredentialKind::Session)
                .map(|credential| (credential.key.as_str(), credential.value.as_str())),
        );
        let token = match self
            .sessions
            .token_for(api, session_credentials.as_ref())
            .await?
        {
            Some(token) => token,
            None => match self.missing_session {
                MissingSessionCredentials::ProceedUnauthenticated => {
                    self.logger.warn(
                        "Session credentials missing, proceeding without authentication",
                        Some(&json!({"api_id": api.id, "api": api.name})),
                    );
                    return Ok(headers);
                }
                MissingSessionCredentials::Fail => {
                    return Err(EngineError::authentication(format!(
                        "Session credentials for API '{}' are missing",
                        api.name
                    ))
                    .with_hint(
                        "Store active 'username' and 'password' credentials of type session.",
                    ))
                }
            },
        };
        headers.insert(
            config.token_header.clone(),
            session_header_value(&config.token_header, &token),
        );
        Ok(headers)
    }
}

/// Create, list, update and delete stored credentials. Values are encrypted before they reach
/// the store and never leave it in views.
pub struct CredentialService {
    store: Arc<dyn RecordStore>,
    cipher: Arc<SecretCipher>,
    logger: Logger,
}

impl CredentialService {
    pub fn new(store: Arc<dyn RecordStore>, cipher: Arc<SecretCipher>, logger: Logger) -> Self {
        Self {
            store,
            cipher,
            logger: logger.child("credential-service"),
        }
    }

    pub async fn create(
        &self,
        api_id: &str,
        kind: &str,
        key: &str,
        value: &str,
        metadata: Option<Value>,
    ) -> Result<CredentialView, EngineError> {
        if kind.trim().is_empty() || key.trim().is_empty() || value.is_empty() {
            return Err(EngineError::invalid_params("type, key and value are required"));
        }
        if self.store.get_api(api_id).await?.is_none() {
            return Err(EngineError::not_found(format!("API '{}' not found", api_id)));
        }
        let record = self
            .store
            .insert_credential(NewCredential {
                api_id: api_id.to_string(),
                kind: CredentialKind::from_label(kind),
                key: key.trim().to_string(),
                value: self.cipher.encrypt(value)?,
                metadata: metadata.unwrap_or_else(|| json!({})),
            })
            .await?;
        self.logger.info(
            "Credential stored",
            Some(&json!({"api_id": api_id, "key": record.key, "kind": record.kind.as_str()})),
        );
        Ok(record.view())
    }

    pub async fn list(&self, api_id: &str) -> Result<Vec<CredentialView>, EngineError> {
        Ok(self
            .store
            .list_credentials(api_id)
            .await?
            .iter()
            .map(Credential::view)
            .collect())
    }

    pub async fn update(
        &self,
        credential_id: &str,
        value: Option<&str>,
        is_active: Option<bool>,
        metadata: Option<Value>,
    ) -> Result<CredentialView, EngineError> {
        let value = match value {
            Some("") => return Err(EngineError::invalid_params("value must not be empty")),
            Some(raw) => Some(self.cipher.encrypt(raw)?),
            None => None,
        };
        let patch = CredentialPatch {
            value,
            is_active,
            metadata,
        };
        let updated = self
            .store
            .update_credential(credential_id, patch)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("Credential '{}' not found", credential_id))
            })?;
        Ok(updated.view())
    }

    pub async fn delete(&self, credential_id: &str) -> Result<(), EngineError> {
        if !self.store.delete_credential(credential_id).await? {
            return Err(EngineError::not_found(format!(
                "Credential '{}' not found",
                credential_id
            )));
        }
        self.logger.info(
            "Credential deleted",
            Some(&json!({"credential_id": credential_id})),
        );
        Ok(())
    }
}
