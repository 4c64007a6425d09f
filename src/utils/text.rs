pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if max_bytes == 0 {
        return String::new();
    }
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Removes Markdown code fences a model may wrap around a JSON reply.
pub fn strip_code_fences(raw: &str) -> String {
    let mut cleaned = raw.trim().to_string();
    for fence in ["```json\n", "```json", "```\n", "```"] {
        cleaned = cleaned.replace(fence, "");
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{strip_code_fences, truncate_utf8_prefix};

    #[test]
    fn truncate_utf8_prefix_handles_ascii() {
        assert_eq!(truncate_utf8_prefix("hello", 3), "hel");
    }

    #[test]
    fn truncate_utf8_prefix_does_not_split_utf8() {
        assert_eq!(truncate_utf8_prefix("añb", 2), "a");
        assert_eq!(truncate_utf8_prefix("añb", 3), "añ");
    }

    #[test]
    fn strip_code_fences_unwraps_json_block() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn strip_code_fences_keeps_plain_json() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }
}
