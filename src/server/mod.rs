//! Line-delimited JSON-RPC 2.0 over stdio.

pub mod protocol;

use crate::engine::Engine;
use crate::errors::{EngineError, ErrorCode, RpcError};
use crate::models::{ApiPatch, AuthType, ExecutionFilter, InsightCategory, InsightFilter, SessionConfig};
use protocol::{JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

const SERVER_NAME: &str = "apirunner";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reads a parameter by its camelCase name, falling back to snake_case.
fn param<'a>(params: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    params
        .get(camel)
        .or_else(|| params.get(snake))
        .filter(|value| !value.is_null())
}

fn optional_str<'a>(params: &'a Value, camel: &str, snake: &str) -> Option<&'a str> {
    param(params, camel, snake).and_then(Value::as_str)
}

fn required_str<'a>(params: &'a Value, camel: &str, snake: &str) -> Result<&'a str, EngineError> {
    optional_str(params, camel, snake)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| EngineError::invalid_params(format!("{} is required", camel)))
}

fn optional_limit(params: &Value) -> Option<usize> {
    param(params, "limit", "limit")
        .and_then(Value::as_u64)
        .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
}

fn api_patch(params: &Value) -> Result<ApiPatch, EngineError> {
    let auth_type = optional_str(params, "authType", "auth_type")
        .map(|raw| raw.parse::<AuthType>())
        .transpose()
        .map_err(|err| EngineError::invalid_params(err.to_string()))?;
    let session = param(params, "session", "session")
        .map(|raw| serde_json::from_value::<SessionConfig>(raw.clone()))
        .transpose()
        .map_err(|err| EngineError::invalid_params(format!("Invalid session config: {}", err)))?;
    Ok(ApiPatch {
        name: optional_str(params, "name", "name").map(str::to_string),
        base_url: optional_str(params, "baseUrl", "base_url").map(str::to_string),
        description: optional_str(params, "description", "description").map(str::to_string),
        auth_type,
        session,
    })
}

fn to_result<T: Serialize>(value: T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|err| EngineError::internal(format!("Failed to encode result: {}", err)))
}

pub struct RpcServer {
    engine: Arc<Engine>,
}

impl RpcServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let engine = &self.engine;
        let result = match method {
            "initialize" => Ok(json!({
                "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
                "methods": [
                    "execute", "execute_all", "generate_parameters",
                    "api_get", "api_update", "api_delete", "endpoint_list",
                    "credential_create", "credential_list", "credential_update", "credential_delete",
                    "execution_list", "execution_get",
                    "insight_list", "insight_delete", "insight_stats", "stats",
                ],
            })),
            "execute" => {
                let endpoint_id = required_str(params, "endpointId", "endpoint_id")?;
                let parameters: Map<String, Value> = match param(params, "parameters", "parameters") {
                    Some(Value::Object(map)) => map.clone(),
                    Some(_) => {
                        return Err(EngineError::invalid_params("parameters must be an object").into())
                    }
                    None => Map::new(),
                };
                let model_key = optional_str(params, "modelKey", "model_key");
                engine
                    .execute(endpoint_id, parameters, model_key)
                    .await
                    .and_then(to_result)
            }
            "execute_all" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                let model_key = optional_str(params, "modelKey", "model_key");
                engine.execute_all(api_id, model_key).await.and_then(to_result)
            }
            "generate_parameters" => {
                let endpoint_id = required_str(params, "endpointId", "endpoint_id")?;
                let model_key = optional_str(params, "modelKey", "model_key");
                engine
                    .generate_parameters_for(endpoint_id, model_key)
                    .await
                    .and_then(to_result)
            }
            "api_get" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                engine.get_api(api_id).await.and_then(to_result)
            }
            "api_update" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                let patch = api_patch(params)?;
                engine.update_api(api_id, patch).await.and_then(to_result)
            }
            "api_delete" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                engine
                    .delete_api(api_id)
                    .await
                    .map(|_| json!({"success": true}))
            }
            "endpoint_list" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                engine.list_endpoints(api_id).await.and_then(to_result)
            }
            "credential_create" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                let kind = required_str(params, "type", "kind")?;
                let key = required_str(params, "key", "key")?;
                let value = required_str(params, "value", "value")?;
                let metadata = param(params, "metadata", "metadata").cloned();
                engine
                    .create_credential(api_id, kind, key, value, metadata)
                    .await
                    .and_then(to_result)
            }
            "credential_list" => {
                let api_id = required_str(params, "apiId", "api_id")?;
                engine.list_credentials(api_id).await.and_then(to_result)
            }
            "credential_update" => {
                let credential_id = required_str(params, "credentialId", "credential_id")?;
                let value = optional_str(params, "value", "value");
                let is_active = param(params, "isActive", "is_active").and_then(Value::as_bool);
                let metadata = param(params, "metadata", "metadata").cloned();
                engine
                    .update_credential(credential_id, value, is_active, metadata)
                    .await
                    .and_then(to_result)
            }
            "credential_delete" => {
                let credential_id = required_str(params, "credentialId", "credential_id")?;
                engine
                    .delete_credential(credential_id)
                    .await
                    .map(|_| json!({"success": true}))
            }
            "execution_list" => {
                let filter = ExecutionFilter {
                    endpoint_id: optional_str(params, "endpointId", "endpoint_id").map(str::to_string),
                    api_id: optional_str(params, "apiId", "api_id").map(str::to_string),
                    limit: optional_limit(params),
                };
                engine.list_executions(filter).await.and_then(to_result)
            }
            "execution_get" => {
                let execution_id = required_str(params, "executionId", "execution_id")?;
                engine.get_execution(execution_id).await.and_then(to_result)
            }
            "insight_list" => {
                let category = optional_str(params, "category", "category")
                    .map(|raw| raw.parse::<InsightCategory>())
                    .transpose()
                    .map_err(|err| EngineError::invalid_params(err.to_string()))?;
                let filter = InsightFilter {
                    execution_id: optional_str(params, "executionId", "execution_id")
                        .map(str::to_string),
                    category,
                    limit: optional_limit(params),
                };
                engine.list_insights(filter).await.and_then(to_result)
            }
            "insight_delete" => {
                let insight_id = required_str(params, "insightId", "insight_id")?;
                engine
                    .delete_insight(insight_id)
                    .await
                    .map(|_| json!({"success": true}))
            }
            "insight_stats" => engine.insight_summary().await.and_then(to_result),
            "stats" => to_result(engine.insight_stats())
                .map(|insights| json!({"insights": insights, "logs": engine.log_stats()})),
            _ => {
                return Err(RpcError::new(
                    ErrorCode::MethodNotFound,
                    format!("Method not found: {}", method),
                ))
            }
        };
        result.map_err(RpcError::from)
    }

    /// Handles one input line. Returns `None` for blank lines and notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError.as_i32(),
                    "Parse error".to_string(),
                ))
            }
        };
        let request = match serde_json::from_value::<JsonRpcRequest>(parsed) {
            Ok(req) if req.jsonrpc == "2.0" => req,
            _ => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                ))
            }
        };

        let outcome = self.dispatch(&request.method, &request.params).await;
        let id = request.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, err.code.as_i32(), err.message),
        })
    }

    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), EngineError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                let payload = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), EngineError> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}
