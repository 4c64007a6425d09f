use crate::utils::text::truncate_utf8_prefix;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const DEFAULT_REDACTION: &str = "[REDACTED]";
const INLINE_REDACTION: &str = "***REDACTED***";

static SENSITIVE_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password",
        "passphrase",
        "secret",
        "token",
        "api_key",
        "apikey",
        "access_token",
        "refresh_token",
        "authorization",
        "client_secret",
        "value",
    ]
    .into_iter()
    .collect()
});

static SENSITIVE_HEADER_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "authorization",
        "proxy-authorization",
        "cookie",
        "x-api-key",
        "x-auth-token",
        "x-access-token",
    ]
    .into_iter()
    .collect()
});

static INLINE_REDACTION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\bsk-[A-Za-z0-9_-]{10,}\b").expect("inline redaction regex"),
            "sk-***REDACTED***",
        ),
        (
            Regex::new(r"\bAIza[0-9A-Za-z_-]{20,}\b").expect("inline redaction regex"),
            "AIza***REDACTED***",
        ),
        (
            Regex::new(r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b")
                .expect("inline redaction regex"),
            INLINE_REDACTION,
        ),
        (
            Regex::new(r"\b(Bearer|Basic)\s+([A-Za-z0-9._~+/=-]{6,})").expect("inline redaction regex"),
            "$1 ***REDACTED***",
        ),
        (
            Regex::new(r#"\b(password|token|api[_-]?key|secret)\b\s*([:=])\s*([^\s"'`,&]+)"#)
                .expect("inline redaction regex"),
            "$1$2***REDACTED***",
        ),
    ]
});

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    if normalized.is_empty() {
        return false;
    }
    if SENSITIVE_KEYS.contains(normalized.as_str()) {
        return true;
    }
    normalized.contains("secret") || normalized.contains("token") || normalized.contains("password")
}

pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADER_KEYS.contains(normalize_key(name).as_str())
}

fn truncate_string(value: &str, max_length: usize) -> String {
    if max_length == usize::MAX || value.len() <= max_length {
        return value.to_string();
    }
    format!("{}...", truncate_utf8_prefix(value, max_length))
}

pub fn redact_text(value: &str, max_string: usize) -> String {
    let mut out = value.to_string();
    for (re, replacement) in INLINE_REDACTION_PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).to_string();
        }
    }
    truncate_string(&out, max_string)
}

fn redact_headers(value: &Value, max_string: usize) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(map) = value.as_object() {
        for (key, entry) in map.iter() {
            if is_sensitive_header(key) {
                out.insert(key.clone(), Value::String(DEFAULT_REDACTION.to_string()));
            } else if let Some(text) = entry.as_str() {
                out.insert(key.clone(), Value::String(redact_text(text, max_string)));
            } else {
                out.insert(key.clone(), entry.clone());
            }
        }
    }
    Value::Object(out)
}

/// Scrubs log metadata: sensitive keys and header values are replaced, strings are checked
/// for inline secrets and truncated to `max_string` bytes.
pub fn redact_object(value: &Value, max_string: usize) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(text) => Value::String(redact_text(text, max_string)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_object(item, max_string))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map.iter() {
                if key == "headers" {
                    out.insert(key.clone(), redact_headers(entry, max_string));
                    continue;
                }
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(DEFAULT_REDACTION.to_string()));
                    continue;
                }
                out.insert(key.clone(), redact_object(entry, max_string));
            }
            Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_object, redact_text};
    use serde_json::Value;

    #[test]
    fn redact_object_masks_authorization_header() {
        let input = serde_json::json!({"headers": {"Authorization": "Bearer abcdef123456", "Accept": "*/*"}});
        let out = redact_object(&input, usize::MAX);
        assert_eq!(out["headers"]["Authorization"], Value::String("[REDACTED]".to_string()));
        assert_eq!(out["headers"]["Accept"], Value::String("*/*".to_string()));
    }

    #[test]
    fn redact_object_masks_session_password() {
        let input = serde_json::json!({"payload": {"user": "ana", "password": "hunter22"}});
        let out = redact_object(&input, usize::MAX);
        assert_eq!(out["payload"]["password"], Value::String("[REDACTED]".to_string()));
        assert_eq!(out["payload"]["user"], Value::String("ana".to_string()));
    }

    #[test]
    fn redact_text_masks_inline_bearer() {
        let out = redact_text("sent Bearer qwertyuiop12 upstream", usize::MAX);
        assert_eq!(out, "sent Bearer ***REDACTED*** upstream");
    }

    #[test]
    fn redact_text_truncates() {
        assert_eq!(redact_text("abcdefgh", 3), "abc...");
    }
}
