use crate::errors::{EngineError, EngineErrorKind};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    NotFound = -32004,
    StoreUnavailable = -32005,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        let mut message = format!("{}: {}", err.code, err.message);
        if let Some(hint) = &err.hint {
            message.push_str(&format!(" (hint: {})", hint));
        }
        let code = match err.kind {
            EngineErrorKind::InvalidParams => ErrorCode::InvalidParams,
            EngineErrorKind::NotFound => ErrorCode::NotFound,
            EngineErrorKind::StoreFailure => ErrorCode::StoreUnavailable,
            _ => ErrorCode::InternalError,
        };
        RpcError::new(code, message)
    }
}
