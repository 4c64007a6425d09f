use serde_json::Value;
use std::collections::HashMap;

/// Replaces `{name}` placeholders inside string leaves of a JSON template.
///
/// Only strings are rewritten: object keys, numbers, booleans and nulls pass through untouched,
/// so a literal such as `12345` can never be corrupted by a substitution. Unknown placeholders
/// are left as-is.
pub fn substitute_placeholders(template: &Value, values: &HashMap<&str, &str>) -> Value {
    match template {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_placeholders(item, values))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map.iter() {
                out.insert(key.clone(), substitute_placeholders(entry, values));
            }
            Value::Object(out)
        }
        Value::String(text) => Value::String(substitute_string(text, values)),
        _ => template.clone(),
    }
}

fn substitute_string(text: &str, values: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        let (prefix, tail) = rest.split_at(start);
        out.push_str(prefix);
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let name = &tail[1..end];
        if name.contains('{') {
            out.push('{');
            rest = &tail[1..];
            continue;
        }
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::substitute_placeholders;
    use std::collections::HashMap;

    fn creds() -> HashMap<&'static str, &'static str> {
        HashMap::from([("username", "ana"), ("password", "s3cr{et}")])
    }

    #[test]
    fn substitutes_nested_leaves() {
        let template = serde_json::json!({
            "auth": {"user": "{username}", "pass": "{password}"},
            "meta": ["{username}@corp", 7, true]
        });
        let out = substitute_placeholders(&template, &creds());
        assert_eq!(
            out,
            serde_json::json!({
                "auth": {"user": "ana", "pass": "s3cr{et}"},
                "meta": ["ana@corp", 7, true]
            })
        );
    }

    #[test]
    fn leaves_unknown_placeholders_and_non_strings() {
        let template = serde_json::json!({"grant": "{grant_type}", "ttl": 3600, "{username}": null});
        let out = substitute_placeholders(&template, &creds());
        assert_eq!(out, serde_json::json!({"grant": "{grant_type}", "ttl": 3600, "{username}": null}));
    }

    #[test]
    fn tolerates_unbalanced_braces() {
        let template = serde_json::json!("{username} {oops");
        let out = substitute_placeholders(&template, &creds());
        assert_eq!(out, serde_json::json!("ana {oops"));

        let template = serde_json::json!("{x {username}}");
        let out = substitute_placeholders(&template, &creds());
        assert_eq!(out, serde_json::json!("{x ana}"));
    }
}
