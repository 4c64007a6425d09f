use crate::constants::models::DEFAULT_MODEL_KEY;
use crate::services::credentials::MissingSessionCredentials;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sqlite" | "file" => StoreKind::Sqlite,
            _ => StoreKind::Memory,
        }
    }
}

/// Process configuration, read from `APIRUNNER_*` environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub store: StoreKind,
    pub db_path: PathBuf,
    pub encryption_key: Option<String>,
    pub key_path: PathBuf,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub default_model_key: String,
    pub log_level: Option<String>,
    pub missing_session: MissingSessionCredentials,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_state_dir() -> PathBuf {
    if let Some(dir) = env_string("APIRUNNER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = env_string("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("apirunner");
    }
    if let Some(home) = env_string("HOME") {
        return PathBuf::from(home).join(".local").join("state").join("apirunner");
    }
    std::env::temp_dir().join("apirunner")
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let state_dir = resolve_state_dir();
        Self {
            store: StoreKind::parse(&env_string("APIRUNNER_STORE").unwrap_or_default()),
            db_path: env_string("APIRUNNER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| state_dir.join("apirunner.sqlite3")),
            encryption_key: env_string("APIRUNNER_ENCRYPTION_KEY"),
            key_path: env_string("APIRUNNER_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| state_dir.join("credentials.key")),
            llm_base_url: env_string("APIRUNNER_LLM_BASE_URL"),
            llm_api_key: env_string("APIRUNNER_LLM_API_KEY"),
            default_model_key: env_string("APIRUNNER_DEFAULT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL_KEY.to_string()),
            log_level: env_string("APIRUNNER_LOG_LEVEL"),
            missing_session: env_string("APIRUNNER_MISSING_SESSION")
                .and_then(|raw| MissingSessionCredentials::from_label(&raw))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StoreKind;

    #[test]
    fn store_kind_defaults_to_memory() {
        assert_eq!(StoreKind::parse(""), StoreKind::Memory);
        assert_eq!(StoreKind::parse("SQLite"), StoreKind::Sqlite);
        assert_eq!(StoreKind::parse("postgres"), StoreKind::Memory);
    }
}
