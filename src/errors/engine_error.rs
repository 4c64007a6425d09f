use crate::stores::StoreError;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    InvalidParams,
    NotFound,
    AuthenticationFailure,
    RemoteCallFailure,
    InsightGenerationFailure,
    StoreFailure,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(
            EngineErrorKind::AuthenticationFailure,
            "AUTHENTICATION_FAILURE",
            message,
        )
    }

    pub fn remote_call(message: impl Into<String>) -> Self {
        Self::new(
            EngineErrorKind::RemoteCallFailure,
            "REMOTE_CALL_FAILURE",
            message,
        )
    }

    pub fn insight_generation(message: impl Into<String>) -> Self {
        Self::new(
            EngineErrorKind::InsightGenerationFailure,
            "INSIGHT_GENERATION_FAILURE",
            message,
        )
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::StoreFailure, "STORE_FAILURE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Internal, "INTERNAL", message)
    }

    /// Errors of these kinds abort `execute`/`execute_all`; everything else is
    /// captured as a failed execution record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::NotFound | EngineErrorKind::StoreFailure
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingParent { entity, id } => {
                EngineError::not_found(format!("{} '{}' not found", entity, id))
            }
            other => EngineError::store(other.to_string())
                .with_hint("The record store is unavailable; no execution record was written."),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_records_and_store_failures_are_fatal() {
        assert!(EngineError::not_found("gone").is_fatal());
        assert!(EngineError::store("down").is_fatal());
        assert!(!EngineError::invalid_params("bad url").is_fatal());
        assert!(!EngineError::authentication("denied").is_fatal());
        assert!(!EngineError::remote_call("timeout").is_fatal());
    }
}
