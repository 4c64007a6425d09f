//! Contracts for the model-backed collaborators the engine calls out to.

pub mod llm;

use crate::errors::EngineError;
use crate::models::{Endpoint, InsightCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedParameters {
    pub parameters: BTreeMap<String, String>,
    pub explanation: String,
}

impl GeneratedParameters {
    /// Reads `{parameters, explanation}`. Non-string parameter values are stringified and nulls
    /// dropped.
    pub fn from_value(value: &Value) -> Self {
        let parameters = value
            .get("parameters")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| {
                        let text = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), text)
                    })
                    .collect()
            })
            .unwrap_or_default();
        let explanation = value
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            parameters,
            explanation,
        }
    }

    pub fn as_json_map(&self) -> serde_json::Map<String, Value> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedInsight {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confidence: Value,
}

impl GeneratedInsight {
    pub fn category(&self) -> Option<InsightCategory> {
        self.category.parse().ok()
    }

    /// Confidence as 0-100. Accepts numbers or numeric strings; anything else is 0.
    pub fn confidence_score(&self) -> u8 {
        let raw = match &self.confidence {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        raw.round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedInsights {
    #[serde(default)]
    pub insights: Vec<GeneratedInsight>,
}

#[async_trait]
pub trait ParameterGenerator: Send + Sync {
    async fn generate_parameters(
        &self,
        endpoint: &Endpoint,
        api_context: &str,
        model_key: &str,
    ) -> Result<GeneratedParameters, EngineError>;
}

#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate_insights(
        &self,
        response: &Value,
        endpoint: &Endpoint,
        model_key: &str,
    ) -> Result<GeneratedInsights, EngineError>;
}

/// Stand-in used when no model endpoint is configured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredCollaborator;

const UNCONFIGURED_HINT: &str = "Set APIRUNNER_LLM_BASE_URL (and APIRUNNER_LLM_API_KEY) to enable model calls.";

#[async_trait]
impl ParameterGenerator for UnconfiguredCollaborator {
    async fn generate_parameters(
        &self,
        _endpoint: &Endpoint,
        _api_context: &str,
        _model_key: &str,
    ) -> Result<GeneratedParameters, EngineError> {
        Err(EngineError::remote_call("No model endpoint configured").with_hint(UNCONFIGURED_HINT))
    }
}

#[async_trait]
impl InsightGenerator for UnconfiguredCollaborator {
    async fn generate_insights(
        &self,
        _response: &Value,
        _endpoint: &Endpoint,
        _model_key: &str,
    ) -> Result<GeneratedInsights, EngineError> {
        Err(EngineError::insight_generation("No model endpoint configured")
            .with_hint(UNCONFIGURED_HINT))
    }
}
