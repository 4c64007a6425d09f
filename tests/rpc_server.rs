use apirunner::models::{AuthType, HttpMethod};
use apirunner::server::RpcServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

mod common;
use common::{harness, seed_api, seed_endpoint, FakeTransport};

async fn server_with_endpoint() -> (RpcServer, Arc<FakeTransport>) {
    let h = harness(FakeTransport::ok(json!({"pong": true})));
    seed_api(&*h.store, "api-1", AuthType::Bearer, None).await;
    seed_endpoint(&*h.store, "api-1", "ep-1", HttpMethod::Get, "/ping").await;
    (RpcServer::new(Arc::new(h.engine)), h.transport)
}

async fn call(server: &RpcServer, request: Value) -> Value {
    let response = server
        .handle_line(&request.to_string())
        .await
        .expect("response");
    serde_json::to_value(&response).expect("encode")
}

#[tokio::test]
async fn execute_then_read_history() {
    let (server, transport) = server_with_endpoint().await;

    let executed = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "execute",
               "params": {"endpointId": "ep-1", "parameters": {"q": "x"}}}),
    )
    .await;
    assert_eq!(executed["id"], 1);
    assert_eq!(executed["result"]["success"], true);
    assert_eq!(executed["result"]["execution"]["statusCode"], 200);
    let execution_id = executed["result"]["execution"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let listed = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 2, "method": "execution_list",
               "params": {"endpoint_id": "ep-1"}}),
    )
    .await;
    assert_eq!(listed["result"].as_array().map(Vec::len), Some(1));
    assert_eq!(listed["result"][0]["id"], execution_id.as_str());
    assert_eq!(listed["result"][0]["parameters"], json!({"q": "x"}));

    let fetched = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 3, "method": "execution_get",
               "params": {"executionId": execution_id}}),
    )
    .await;
    assert_eq!(fetched["result"]["response"], json!({"pong": true}));
    assert_eq!(transport.requests().len(), 1);

    let stats = call(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "stats"})).await;
    assert_eq!(stats["result"]["insights"]["enqueued"], 1);
    assert!(stats["result"]["logs"]["info"].is_u64());
}

#[tokio::test]
async fn errors_map_to_json_rpc_codes() {
    let (server, _transport) = server_with_endpoint().await;

    let missing = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "execute", "params": {"endpointId": "nope"}}),
    )
    .await;
    assert_eq!(missing["error"]["code"], -32004);

    let invalid = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 2, "method": "execute", "params": {}}),
    )
    .await;
    assert_eq!(invalid["error"]["code"], -32602);

    let unknown = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 3, "method": "reports/render", "params": {}}),
    )
    .await;
    assert_eq!(unknown["error"]["code"], -32601);

    let garbled = server.handle_line("{not json").await.expect("response");
    let garbled = serde_json::to_value(&garbled).expect("encode");
    assert_eq!(garbled["error"]["code"], -32700);
    assert_eq!(garbled["id"], Value::Null);
}

#[tokio::test]
async fn notifications_and_blank_lines_get_no_reply() {
    let (server, transport) = server_with_endpoint().await;
    assert!(server.handle_line("   ").await.is_none());
    let silent = server
        .handle_line(
            &json!({"jsonrpc": "2.0", "method": "execute", "params": {"endpointId": "ep-1"}})
                .to_string(),
        )
        .await;
    assert!(silent.is_none());
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn serve_writes_one_line_per_response() {
    let (server, _transport) = server_with_endpoint().await;
    let input = format!(
        "{}\n\n{}\n",
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "credential_list", "params": {"apiId": "api-1"}}),
    );
    let mut output: Vec<u8> = Vec::new();
    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("serve");

    let lines: Vec<Value> = String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["result"]["serverInfo"]["name"], "apirunner");
    assert_eq!(lines[1]["result"], json!([]));
}

#[tokio::test]
async fn api_maintenance_updates_lists_and_deletes() {
    let (server, transport) = server_with_endpoint().await;

    let endpoints = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "endpoint_list", "params": {"apiId": "api-1"}}),
    )
    .await;
    assert_eq!(endpoints["result"].as_array().map(Vec::len), Some(1));
    assert_eq!(endpoints["result"][0]["path"], "/ping");

    let updated = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 2, "method": "api_update",
               "params": {"apiId": "api-1", "name": "Renamed", "baseUrl": "http://other.example.com"}}),
    )
    .await;
    assert_eq!(updated["result"]["name"], "Renamed");
    assert_eq!(updated["result"]["baseUrl"], "http://other.example.com");
    assert_eq!(updated["result"]["authType"], "bearer");

    call(
        &server,
        json!({"jsonrpc": "2.0", "id": 3, "method": "execute", "params": {"endpointId": "ep-1"}}),
    )
    .await;
    assert_eq!(transport.requests()[0].url, "https://other.example.com/ping");

    let no_session = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 4, "method": "api_update",
               "params": {"apiId": "api-1", "authType": "session"}}),
    )
    .await;
    assert_eq!(no_session["error"]["code"], -32602);

    let bad_kind = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 5, "method": "api_update",
               "params": {"apiId": "api-1", "authType": "kerberos"}}),
    )
    .await;
    assert_eq!(bad_kind["error"]["code"], -32602);

    let deleted = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 6, "method": "api_delete", "params": {"apiId": "api-1"}}),
    )
    .await;
    assert_eq!(deleted["result"]["success"], true);

    for (id, method, params) in [
        (7, "endpoint_list", json!({"apiId": "api-1"})),
        (8, "execute", json!({"endpointId": "ep-1"})),
        (9, "api_delete", json!({"apiId": "api-1"})),
        (10, "api_get", json!({"apiId": "api-1"})),
    ] {
        let missing = call(
            &server,
            json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
        )
        .await;
        assert_eq!(missing["error"]["code"], -32004, "{}", method);
    }
}

#[tokio::test]
async fn insights_can_be_filtered_summarized_and_deleted() {
    let h = harness(FakeTransport::ok(json!({"pong": true})));
    seed_api(&*h.store, "api-1", AuthType::Bearer, None).await;
    seed_endpoint(&*h.store, "api-1", "ep-1", HttpMethod::Get, "/ping").await;
    let engine = Arc::new(h.engine);
    let server = RpcServer::new(engine.clone());

    let mut execution_ids = Vec::new();
    for id in 1..=2 {
        let executed = call(
            &server,
            json!({"jsonrpc": "2.0", "id": id, "method": "execute", "params": {"endpointId": "ep-1"}}),
        )
        .await;
        execution_ids.push(
            executed["result"]["execution"]["id"]
                .as_str()
                .expect("id")
                .to_string(),
        );
    }
    assert!(engine.insights().wait_idle(Duration::from_secs(2)).await);

    let all = call(&server, json!({"jsonrpc": "2.0", "id": 3, "method": "insight_list"})).await;
    assert_eq!(all["result"].as_array().map(Vec::len), Some(2));

    let for_first = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 4, "method": "insight_list",
               "params": {"executionId": execution_ids[0]}}),
    )
    .await;
    assert_eq!(for_first["result"].as_array().map(Vec::len), Some(1));
    assert_eq!(for_first["result"][0]["executionId"], execution_ids[0].as_str());

    let risks = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 5, "method": "insight_list", "params": {"category": "risk"}}),
    )
    .await;
    assert_eq!(risks["result"], json!([]));

    let unknown = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 6, "method": "insight_list", "params": {"category": "gossip"}}),
    )
    .await;
    assert_eq!(unknown["error"]["code"], -32602);

    let stats = call(&server, json!({"jsonrpc": "2.0", "id": 7, "method": "insight_stats"})).await;
    assert_eq!(stats["result"]["total"], 2);
    assert_eq!(stats["result"]["byCategory"], json!([{"category": "trend", "count": 2}]));
    assert_eq!(stats["result"]["byModel"][0]["count"], 2);
    assert_eq!(stats["result"]["averageConfidence"], 85.0);

    let insight_id = for_first["result"][0]["id"].as_str().expect("insight id").to_string();
    let deleted = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 8, "method": "insight_delete",
               "params": {"insightId": insight_id}}),
    )
    .await;
    assert_eq!(deleted["result"]["success"], true);

    let again = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 9, "method": "insight_delete",
               "params": {"insightId": insight_id}}),
    )
    .await;
    assert_eq!(again["error"]["code"], -32004);

    let stats = call(&server, json!({"jsonrpc": "2.0", "id": 10, "method": "insight_stats"})).await;
    assert_eq!(stats["result"]["total"], 1);
}
