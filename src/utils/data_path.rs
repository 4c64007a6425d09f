use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Splits a dot-separated path such as `data.items.0.token`. Empty segments are dropped.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    path.trim()
        .split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(segment.to_string()),
        })
        .collect()
}

/// Walks `path` through `target`. A numeric segment addresses an array element, or an object
/// key with that literal name when the current node is an object.
pub fn get_path_value<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return None;
    }
    let mut current = target;
    for segment in segments.iter() {
        current = match (segment, current) {
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Like [`get_path_value`] but only accepts a non-empty string terminal.
pub fn get_path_string(target: &Value, path: &str) -> Option<String> {
    get_path_value(target, path)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_token() {
        let body = serde_json::json!({"data": {"token": "abc"}});
        assert_eq!(get_path_string(&body, "data.token"), Some("abc".to_string()));
    }

    #[test]
    fn missing_segment_is_none() {
        let body = serde_json::json!({"data": {"token": "abc"}});
        assert_eq!(get_path_string(&body, "data.missing"), None);
    }

    #[test]
    fn non_string_terminal_is_none() {
        let body = serde_json::json!({"data": {"token": 42, "nested": {"a": 1}}});
        assert_eq!(get_path_string(&body, "data.token"), None);
        assert_eq!(get_path_string(&body, "data.nested"), None);
    }

    #[test]
    fn numeric_segment_indexes_arrays() {
        let body = serde_json::json!({"sessions": [{"jwt": "first"}, {"jwt": "second"}]});
        assert_eq!(get_path_string(&body, "sessions.1.jwt"), Some("second".to_string()));
    }

    #[test]
    fn empty_path_is_none() {
        let body = serde_json::json!("token");
        assert!(get_path_value(&body, " ").is_none());
        assert_eq!(parse_path("a..b"), vec![PathSegment::Key("a".into()), PathSegment::Key("b".into())]);
    }
}
