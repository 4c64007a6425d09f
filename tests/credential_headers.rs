use apirunner::models::{AuthType, CredentialKind, HttpMethod};
use apirunner::services::credentials::{credential_headers, ResolvedCredential};
use apirunner::stores::RecordStore;
use serde_json::json;

mod common;
use common::{harness, params, seed_api, seed_endpoint, FakeTransport};

const KINDS: [CredentialKind; 5] = [
    CredentialKind::ApiKey,
    CredentialKind::Bearer,
    CredentialKind::Basic,
    CredentialKind::Session,
    CredentialKind::Custom,
];

#[test]
fn api_key_values_never_reach_headers_for_any_credential_set() {
    // every subset of kinds, each with a distinct secret
    for mask in 0u32..(1 << KINDS.len()) {
        let credentials: Vec<ResolvedCredential> = KINDS
            .iter()
            .enumerate()
            .filter(|(idx, _)| mask & (1 << idx) != 0)
            .map(|(idx, kind)| ResolvedCredential {
                kind: *kind,
                key: format!("key-{}", idx),
                value: format!("secret-{}", idx),
            })
            .collect();
        for method in [HttpMethod::Get, HttpMethod::Post] {
            let headers = credential_headers(method, &credentials);
            assert!(!headers.contains_key("key-0"), "mask {}", mask);
            assert!(
                headers.values().all(|value| !value.contains("secret-0")),
                "api key leaked for mask {}",
                mask
            );
            assert!(
                headers.values().all(|value| !value.contains("secret-3")),
                "session credential leaked for mask {}",
                mask
            );
        }
    }
}

#[tokio::test]
async fn stored_credentials_are_applied_to_the_call() {
    let h = harness(FakeTransport::ok(json!({"ok": true})));
    seed_api(&*h.store, "api-1", AuthType::ApiKey, None).await;
    seed_endpoint(&*h.store, "api-1", "ep-1", HttpMethod::Get, "/report").await;

    h.engine
        .create_credential("api-1", "apikey", "api_key", "k-123", None)
        .await
        .expect("apikey");
    h.engine
        .create_credential("api-1", "bearer", "token", "t-456", None)
        .await
        .expect("bearer");
    h.engine
        .create_credential("api-1", "X-Tenant", "X-Tenant", "acme", None)
        .await
        .expect("custom");

    h.engine
        .execute("ep-1", params(json!({"from": "2024-01-01"})), None)
        .await
        .expect("execute");

    let request = &h.transport.requests()[0];
    assert!(request.headers.values().all(|value| value != "k-123"));
    assert!(!request.headers.contains_key("api_key"));
    assert_eq!(request.header("Authorization"), Some("Bearer t-456"));
    assert_eq!(request.header("X-Tenant"), Some("acme"));
    assert_eq!(request.header("User-Agent"), Some("APIIntelligencePlatform/1.0"));
    assert!(request
        .query
        .contains(&("api_key".to_string(), "k-123".to_string())));

    let stored = h.engine.list_executions(Default::default()).await.expect("history");
    assert_eq!(stored[0].execution.parameters, json!({"from": "2024-01-01"}));
}

#[tokio::test]
async fn basic_credentials_are_base64_encoded() {
    let h = harness(FakeTransport::ok(json!({"ok": true})));
    seed_api(&*h.store, "api-1", AuthType::Basic, None).await;
    seed_endpoint(&*h.store, "api-1", "ep-1", HttpMethod::Delete, "/items/1").await;
    h.engine
        .create_credential("api-1", "basic", "auth", "user:pass", None)
        .await
        .expect("basic");

    h.engine.execute("ep-1", params(json!({})), None).await.expect("execute");

    let request = &h.transport.requests()[0];
    assert_eq!(request.header("Authorization"), Some("Basic dXNlcjpwYXNz"));
    assert!(request.header("Content-Type").is_none());
}

#[tokio::test]
async fn undecryptable_credential_is_recorded_as_auth_failure() {
    let h = harness(FakeTransport::ok(json!({"ok": true})));
    seed_api(&*h.store, "api-1", AuthType::Bearer, None).await;
    seed_endpoint(&*h.store, "api-1", "ep-1", HttpMethod::Get, "/x").await;
    h.store
        .insert_credential(apirunner::models::NewCredential {
            api_id: "api-1".to_string(),
            kind: CredentialKind::Bearer,
            key: "token".to_string(),
            value: "not-encrypted".to_string(),
            metadata: json!({}),
        })
        .await
        .expect("raw insert");

    let result = h.engine.execute("ep-1", params(json!({})), None).await.expect("execute");
    assert!(!result.success);
    assert_eq!(result.execution.status_code, 401);
    assert!(h.transport.requests().is_empty());
}
