use crate::constants::network::USER_AGENT;
use crate::models::HttpMethod;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A fully resolved outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl RequestSpec {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON body, or the raw text as a JSON string when it is not JSON.
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u128),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Network(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: RequestSpec) -> Result<HttpResponse, TransportError>;
}

/// Turns a response body into JSON. Empty bodies become `null`, non-JSON text a JSON string.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("invalid header name '{}'", key)))?;
        let val = HeaderValue::from_str(value).map_err(|_| {
            TransportError::InvalidRequest(format!("invalid value for header '{}'", key))
        })?;
        map.insert(name, val);
    }
    Ok(map)
}

/// Default transport over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| {
                TransportError::InvalidRequest(format!("failed to build HTTP client: {}", err))
            })?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(timeout.as_millis());
    }
    if err.is_builder() {
        return TransportError::InvalidRequest(err.to_string());
    }
    TransportError::Network(err.to_string())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: RequestSpec) -> Result<HttpResponse, TransportError> {
        let mut req = self
            .client
            .request(to_method(request.method), request.url.as_str())
            .headers(to_header_map(&request.headers)?)
            .timeout(request.timeout);
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req.body(serde_json::to_vec(body).map_err(|err| {
                TransportError::InvalidRequest(format!("body is not serializable: {}", err))
            })?);
        }

        let response = req
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, request.timeout))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, request.timeout))?;
        Ok(HttpResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}
