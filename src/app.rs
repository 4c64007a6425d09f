use crate::collaborators::llm::ChatCompletionsClient;
use crate::collaborators::{InsightGenerator, ParameterGenerator, UnconfiguredCollaborator};
use crate::config::{EngineConfig, StoreKind};
use crate::engine::{Engine, EngineParts};
use crate::errors::EngineError;
use crate::services::http_transport::{HttpTransport, ReqwestTransport};
use crate::services::logger::{LogLevel, Logger};
use crate::services::secrets::SecretCipher;
use crate::stores::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use serde_json::json;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub config: EngineConfig,
    pub engine: Arc<Engine>,
}

impl App {
    fn open_store(config: &EngineConfig) -> Result<Arc<dyn RecordStore>, EngineError> {
        Ok(match config.store {
            StoreKind::Memory => Arc::new(MemoryRecordStore::new()),
            StoreKind::Sqlite => Arc::new(SqliteRecordStore::open(&config.db_path)?),
        })
    }

    /// Builds the engine from configuration. Must run inside a tokio runtime.
    pub fn initialize(config: EngineConfig) -> Result<Self, EngineError> {
        let logger = match config.log_level.as_deref() {
            Some(level) => Logger::with_level("apirunner", LogLevel::parse(level)),
            None => Logger::new("apirunner"),
        };

        let store = Self::open_store(&config)?;
        let cipher = Arc::new(SecretCipher::load(
            config.encryption_key.as_deref(),
            &config.key_path,
        )?);
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new().map_err(|err| {
            EngineError::internal(format!("Failed to build HTTP transport: {}", err))
        })?);

        let (parameters, insights): (Arc<dyn ParameterGenerator>, Arc<dyn InsightGenerator>) =
            match config.llm_base_url.as_deref() {
                Some(base_url) => {
                    let client = Arc::new(ChatCompletionsClient::new(
                        transport.clone(),
                        base_url,
                        config.llm_api_key.clone(),
                        logger.clone(),
                    ));
                    let parameters: Arc<dyn ParameterGenerator> = client.clone();
                    let insights: Arc<dyn InsightGenerator> = client;
                    (parameters, insights)
                }
                None => {
                    logger.warn(
                        "No model endpoint configured; parameter and insight generation are disabled",
                        None,
                    );
                    let parameters: Arc<dyn ParameterGenerator> = Arc::new(UnconfiguredCollaborator);
                    let insights: Arc<dyn InsightGenerator> = Arc::new(UnconfiguredCollaborator);
                    (parameters, insights)
                }
            };

        let mut parts = EngineParts::new(store, transport, cipher, parameters, insights);
        parts.default_model_key = config.default_model_key.clone();
        parts.missing_session = config.missing_session;
        parts.logger = logger.clone();
        let engine = Arc::new(Engine::new(parts));

        logger.info(
            "Engine initialized",
            Some(&json!({
                "store": format!("{:?}", config.store).to_lowercase(),
                "db_path": config.db_path.display().to_string(),
                "model": config.default_model_key,
                "llm": config.llm_base_url.is_some(),
            })),
        );
        Ok(Self {
            logger,
            config,
            engine,
        })
    }
}
