use crate::constants::network::{FORCED_SCHEME, TIMEOUT_API_REQUEST_MS};
use crate::errors::EngineError;
use crate::models::{Api, Endpoint};
use crate::services::http_transport::RequestSpec;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Joins a base URL and an endpoint path. The scheme is always forced to https, trailing
/// slashes of the base and leading slashes of the path collapse to a single separator.
pub fn build_endpoint_url(base_url: &str, path: &str) -> Result<String, EngineError> {
    let trimmed = base_url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let host = without_scheme.trim_end_matches('/');
    if host.is_empty() {
        return Err(EngineError::invalid_params(format!(
            "Invalid base URL '{}'",
            base_url
        )));
    }
    let url = format!(
        "{}://{}/{}",
        FORCED_SCHEME,
        host,
        path.trim().trim_start_matches('/')
    );
    Url::parse(&url).map_err(|err| {
        EngineError::invalid_params(format!("Invalid endpoint URL '{}': {}", url, err))
    })?;
    Ok(url)
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Query pairs for a parameter map. Arrays repeat their key, nulls are dropped.
pub fn query_pairs(parameters: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = stringify(item) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = stringify(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }
    pairs
}

/// Builds the outbound request for an endpoint. GET and DELETE carry parameters in the query
/// string, POST/PUT/PATCH as a JSON body.
pub fn build_request(
    api: &Api,
    endpoint: &Endpoint,
    headers: BTreeMap<String, String>,
    parameters: &Map<String, Value>,
) -> Result<RequestSpec, EngineError> {
    let url = build_endpoint_url(&api.base_url, &endpoint.path)?;
    let (query, body) = if endpoint.method.carries_body() {
        (Vec::new(), Some(Value::Object(parameters.clone())))
    } else {
        (query_pairs(parameters), None)
    };
    Ok(RequestSpec {
        method: endpoint.method,
        url,
        headers,
        query,
        body,
        timeout: Duration::from_millis(TIMEOUT_API_REQUEST_MS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthType, EndpointParameters, HttpMethod};
    use serde_json::json;

    fn api(base_url: &str) -> Api {
        Api {
            id: "api-1".into(),
            name: "Weather".into(),
            base_url: base_url.into(),
            description: None,
            auth_type: AuthType::ApiKey,
            session: None,
        }
    }

    fn endpoint(method: HttpMethod) -> Endpoint {
        Endpoint {
            id: "ep-1".into(),
            api_id: "api-1".into(),
            method,
            path: "/forecast".into(),
            parameters: EndpointParameters::default(),
            description: None,
        }
    }

    #[test]
    fn forces_https_and_collapses_slashes() {
        assert_eq!(
            build_endpoint_url("http://x.com/", "//a/b").expect("url"),
            "https://x.com/a/b"
        );
        assert_eq!(
            build_endpoint_url("x.com/v1///", "items").expect("url"),
            "https://x.com/v1/items"
        );
    }

    #[test]
    fn rejects_empty_base() {
        assert!(build_endpoint_url("https://", "/a").is_err());
    }

    #[test]
    fn get_uses_query_and_post_uses_body() {
        let params = json!({"city": "Lima", "days": 3, "skip": null})
            .as_object()
            .cloned()
            .unwrap_or_default();

        let get = build_request(&api("https://x.com"), &endpoint(HttpMethod::Get), BTreeMap::new(), &params)
            .expect("get");
        assert!(get.body.is_none());
        assert_eq!(
            get.query,
            vec![("city".to_string(), "Lima".to_string()), ("days".to_string(), "3".to_string())]
        );

        let post = build_request(&api("https://x.com"), &endpoint(HttpMethod::Post), BTreeMap::new(), &params)
            .expect("post");
        assert!(post.query.is_empty());
        assert_eq!(post.body, Some(Value::Object(params)));
        assert_eq!(post.timeout, Duration::from_secs(30));
    }
}
