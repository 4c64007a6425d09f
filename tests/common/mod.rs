#![allow(dead_code)]

use apirunner::collaborators::{
    GeneratedInsight, GeneratedInsights, GeneratedParameters, InsightGenerator, ParameterGenerator,
};
use apirunner::engine::{Engine, EngineParts};
use apirunner::errors::EngineError;
use apirunner::models::{Api, AuthType, Endpoint, EndpointParameters, HttpMethod, SessionConfig};
use apirunner::services::http_transport::{HttpResponse, HttpTransport, RequestSpec, TransportError};
use apirunner::services::logger::{LogLevel, Logger};
use apirunner::services::secrets::SecretCipher;
use apirunner::services::session_auth::InMemoryTokenCache;
use apirunner::stores::{MemoryRecordStore, RecordStore};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TEST_KEY: &str = "integration-test-key";

pub fn quiet_logger() -> Logger {
    Logger::with_level("test", LogLevel::Error)
}

pub fn cipher() -> Arc<SecretCipher> {
    Arc::new(SecretCipher::from_key(TEST_KEY))
}

type Responder = Box<dyn Fn(&RequestSpec) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Records every request and answers through a closure. Never touches the network.
pub struct FakeTransport {
    responder: Responder,
    delay: Duration,
    requests: StdMutex<Vec<RequestSpec>>,
    events: StdMutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(&RequestSpec) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            requests: StdMutex::new(Vec::new()),
            events: StdMutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(move |_| {
            Ok(HttpResponse {
                status: 200,
                body: body.clone(),
            })
        })
    }

    /// Answers `/login` with `{"data":{"token": token}}` and everything else with `{"ok":true}`.
    pub fn session(token: &'static str) -> Self {
        Self::new(move |request| {
            if request.url.ends_with("/auth/login") {
                Ok(HttpResponse {
                    status: 200,
                    body: json!({"data": {"token": token}}),
                })
            } else {
                Ok(HttpResponse {
                    status: 200,
                    body: json!({"ok": true}),
                })
            }
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_matching(&self, suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.ends_with(suffix))
            .count()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: RequestSpec) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.events.lock().unwrap().push(format!("start {}", request.url));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("end {}", request.url));
        (self.responder)(&request)
    }
}

/// Returns `{"q": "test"}` for every endpoint except the paths listed in `failing`.
#[derive(Default)]
pub struct StaticParameters {
    pub failing: HashSet<String>,
    pub calls: AtomicUsize,
}

impl StaticParameters {
    pub fn failing_for(paths: &[&str]) -> Self {
        Self {
            failing: paths.iter().map(|p| p.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ParameterGenerator for StaticParameters {
    async fn generate_parameters(
        &self,
        endpoint: &Endpoint,
        _api_context: &str,
        _model_key: &str,
    ) -> Result<GeneratedParameters, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&endpoint.path) {
            return Err(EngineError::remote_call(format!(
                "parameter generation failed for {}",
                endpoint.path
            )));
        }
        let mut parameters = BTreeMap::new();
        parameters.insert("q".to_string(), "test".to_string());
        Ok(GeneratedParameters {
            parameters,
            explanation: "fixture".to_string(),
        })
    }
}

/// Produces one `trend` insight and one with an unknown category per call.
#[derive(Default)]
pub struct RecordingInsights {
    pub calls: AtomicUsize,
    pub models: StdMutex<Vec<String>>,
}

#[async_trait]
impl InsightGenerator for RecordingInsights {
    async fn generate_insights(
        &self,
        _response: &Value,
        _endpoint: &Endpoint,
        model_key: &str,
    ) -> Result<GeneratedInsights, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(model_key.to_string());
        Ok(GeneratedInsights {
            insights: vec![
                GeneratedInsight {
                    title: "Rising volume".to_string(),
                    description: "Requests grew this week".to_string(),
                    category: "trend".to_string(),
                    confidence: json!(85),
                },
                GeneratedInsight {
                    title: "Ignored".to_string(),
                    description: "Unknown category".to_string(),
                    category: "gossip".to_string(),
                    confidence: json!(10),
                },
            ],
        })
    }
}

pub struct FailingInsights;

#[async_trait]
impl InsightGenerator for FailingInsights {
    async fn generate_insights(
        &self,
        _response: &Value,
        _endpoint: &Endpoint,
        _model_key: &str,
    ) -> Result<GeneratedInsights, EngineError> {
        Err(EngineError::insight_generation("model unavailable"))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryRecordStore>,
    pub transport: Arc<FakeTransport>,
    pub token_cache: Arc<InMemoryTokenCache>,
}

pub fn harness_with(
    transport: FakeTransport,
    parameters: Arc<dyn ParameterGenerator>,
    insights: Arc<dyn InsightGenerator>,
) -> Harness {
    harness_configured(transport, parameters, insights, |_| {})
}

/// Like [`harness_with`], with a hook to adjust the parts before the engine is built.
pub fn harness_configured(
    transport: FakeTransport,
    parameters: Arc<dyn ParameterGenerator>,
    insights: Arc<dyn InsightGenerator>,
    configure: impl FnOnce(&mut EngineParts),
) -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let transport = Arc::new(transport);
    let token_cache = Arc::new(InMemoryTokenCache::new());
    let mut parts = EngineParts::new(
        store.clone(),
        transport.clone(),
        cipher(),
        parameters,
        insights,
    );
    parts.token_cache = token_cache.clone();
    parts.logger = quiet_logger();
    configure(&mut parts);
    Harness {
        engine: Engine::new(parts),
        store,
        transport,
        token_cache,
    }
}

pub fn harness(transport: FakeTransport) -> Harness {
    harness_with(
        transport,
        Arc::new(StaticParameters::default()),
        Arc::new(RecordingInsights::default()),
    )
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        auth_endpoint: "/auth/login".to_string(),
        auth_method: HttpMethod::Post,
        auth_payload: json!({
            "user": "{username}",
            "pass": "{password}",
            "remember": true,
            "attempts": 3,
            "meta": {"tenant": "acme-{username}"}
        }),
        token_path: "data.token".to_string(),
        token_header: "Authorization".to_string(),
    }
}

pub async fn seed_api(
    store: &dyn RecordStore,
    id: &str,
    auth_type: AuthType,
    session: Option<SessionConfig>,
) -> Api {
    seed_api_at(store, id, "http://api.example.com/", auth_type, session).await
}

pub async fn seed_api_at(
    store: &dyn RecordStore,
    id: &str,
    base_url: &str,
    auth_type: AuthType,
    session: Option<SessionConfig>,
) -> Api {
    store
        .save_api(Api {
            id: id.to_string(),
            name: format!("{} api", id),
            base_url: base_url.to_string(),
            description: Some("fixture api".to_string()),
            auth_type,
            session,
        })
        .await
        .expect("save api")
}

pub async fn seed_endpoint(
    store: &dyn RecordStore,
    api_id: &str,
    id: &str,
    method: HttpMethod,
    path: &str,
) -> Endpoint {
    store
        .save_endpoint(Endpoint {
            id: id.to_string(),
            api_id: api_id.to_string(),
            method,
            path: path.to_string(),
            parameters: EndpointParameters {
                required: vec!["q".to_string()],
                optional: Vec::new(),
            },
            description: None,
        })
        .await
        .expect("save endpoint")
}

pub fn params(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
