use crate::collaborators::{
    GeneratedInsights, GeneratedParameters, InsightGenerator, ParameterGenerator,
};
use crate::constants::network::{TIMEOUT_LLM_REQUEST_MS, USER_AGENT};
use crate::errors::EngineError;
use crate::models::{Endpoint, HttpMethod};
use crate::services::http_transport::{HttpTransport, RequestSpec};
use crate::services::logger::Logger;
use crate::utils::text::strip_code_fences;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You are an API analysis assistant. Reply with a single JSON document and nothing else.";

fn parameters_prompt(endpoint: &Endpoint, api_context: &str) -> String {
    format!(
        "I need to call this API endpoint:\n\n\
         ENDPOINT: {} {}\n\
         DESCRIPTION: {}\n\
         REQUIRED PARAMETERS: {}\n\
         OPTIONAL PARAMETERS: {}\n\n\
         API CONTEXT:\n{}\n\n\
         Generate REALISTIC, WORKING example values for every parameter.\n\
         Reply in JSON:\n\
         {{\n  \"parameters\": {{\"parameter_name\": \"example_value\"}},\n  \
         \"explanation\": \"Short explanation of what these parameters do\"\n}}\n\n\
         IMPORTANT: return ONLY the JSON, without extra commentary.",
        endpoint.method,
        endpoint.path,
        endpoint.description.as_deref().unwrap_or("Not specified"),
        json!(endpoint.parameters.required),
        json!(endpoint.parameters.optional),
        api_context
    )
}

fn insights_prompt(response: &Value, endpoint: &Endpoint) -> String {
    let pretty = serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string());
    format!(
        "Analyze this API response and produce valuable insights:\n\n\
         ENDPOINT: {} {}\n\
         RESPONSE:\n{}\n\n\
         Produce insights in these categories:\n\
         - trend: patterns or trends\n\
         - anomaly: unusual or out-of-range data\n\
         - opportunity: recommended actions\n\
         - risk: potential problems\n\n\
         Reply in JSON:\n\
         {{\n  \"insights\": [\n    {{\n      \"title\": \"Insight title\",\n      \
         \"description\": \"Plain-language description\",\n      \
         \"category\": \"trend|anomaly|opportunity|risk\",\n      \"confidence\": 85\n    }}\n  ]\n}}\n\n\
         IMPORTANT:\n- Use plain, non-technical language\n- Insights must be actionable\n\
         - Return ONLY the JSON, without extra commentary",
        endpoint.method, endpoint.path, pretty
    )
}

/// Parses a model reply as JSON after stripping markdown fences.
pub fn parse_model_json(reply: &str) -> Result<Value, EngineError> {
    let cleaned = strip_code_fences(reply);
    serde_json::from_str(&cleaned).map_err(|err| {
        EngineError::internal("model did not return valid JSON")
            .with_details(json!({"error": err.to_string()}))
    })
}

/// OpenAI-compatible chat-completions client serving both collaborator contracts.
pub struct ChatCompletionsClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: Option<String>,
    logger: Logger,
}

impl ChatCompletionsClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: &str,
        api_key: Option<String>,
        logger: Logger,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            logger: logger.child("llm"),
        }
    }

    async fn complete(&self, model_key: &str, prompt: String) -> Result<Value, EngineError> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
        if let Some(key) = &self.api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {}", key));
        }
        let request = RequestSpec {
            method: HttpMethod::Post,
            url: format!("{}/chat/completions", self.base_url),
            headers,
            query: Vec::new(),
            body: Some(json!({
                "model": model_key,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": prompt},
                ],
            })),
            timeout: Duration::from_millis(TIMEOUT_LLM_REQUEST_MS),
        };

        self.logger
            .debug("Model request", Some(&json!({"model": model_key})));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|err| EngineError::remote_call(format!("Model request failed: {}", err)))?;
        if !response.is_success() {
            return Err(EngineError::remote_call(format!(
                "Model request failed with status {}",
                response.status
            ))
            .with_details(response.body));
        }
        let content = response
            .body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::internal("model reply has no message content"))?;
        parse_model_json(content)
    }
}

#[async_trait]
impl ParameterGenerator for ChatCompletionsClient {
    async fn generate_parameters(
        &self,
        endpoint: &Endpoint,
        api_context: &str,
        model_key: &str,
    ) -> Result<GeneratedParameters, EngineError> {
        let reply = self
            .complete(model_key, parameters_prompt(endpoint, api_context))
            .await?;
        Ok(GeneratedParameters::from_value(&reply))
    }
}

#[async_trait]
impl InsightGenerator for ChatCompletionsClient {
    async fn generate_insights(
        &self,
        response: &Value,
        endpoint: &Endpoint,
        model_key: &str,
    ) -> Result<GeneratedInsights, EngineError> {
        let reply = self
            .complete(model_key, insights_prompt(response, endpoint))
            .await
            .map_err(|err| EngineError::insight_generation(err.message))?;
        serde_json::from_value(reply).map_err(|err| {
            EngineError::insight_generation(format!("unexpected insight payload: {}", err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_model_json_strips_fences() {
        let parsed = parse_model_json("```json\n{\"parameters\": {}}\n```").expect("json");
        assert_eq!(parsed, json!({"parameters": {}}));
        let err = parse_model_json("sure, here you go").expect_err("invalid");
        assert_eq!(err.message, "model did not return valid JSON");
    }
}
