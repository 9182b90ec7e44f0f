//! Pulls keyword lists out of free-form model replies.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

/// Returns the body of the first fenced block, or the trimmed text when
/// there is none.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed)
}

fn strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Loose `a, "b", 'c'` or one-per-line lists, optionally bracketed.
fn split_list(raw: &str) -> Vec<String> {
    let inner = raw.strip_prefix('[').unwrap_or(raw);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    inner
        .split([',', '\n'])
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses a reply into at most `max_terms` keywords.
///
/// Accepts a JSON string array, an object with a `terms` array, or a
/// plain comma/newline list. Valid JSON of any other shape yields nothing.
pub fn parse_terms(reply: &str, max_terms: usize) -> Vec<String> {
    let raw = strip_code_fences(reply);
    if raw.is_empty() {
        return Vec::new();
    }

    let mut terms = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => strings(&items),
        Ok(Value::Object(map)) => match map.get("terms") {
            Some(Value::Array(items)) => strings(items),
            _ => Vec::new(),
        },
        Ok(_) => Vec::new(),
        Err(_) => split_list(raw),
    };
    terms.truncate(max_terms);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array() {
        assert_eq!(
            parse_terms(r#"["Card grid", "Soft shadow", 3]"#, 10),
            vec!["Card grid", "Soft shadow"]
        );
    }

    #[test]
    fn fenced_json_array() {
        let reply = "Here you go:\n```json\n[\"Glassmorphism\", \"Pill buttons\"]\n```";
        assert_eq!(parse_terms(reply, 10), vec!["Glassmorphism", "Pill buttons"]);
    }

    #[test]
    fn terms_object() {
        assert_eq!(
            parse_terms(r#"{"terms": ["Serif headline", "Muted palette"]}"#, 10),
            vec!["Serif headline", "Muted palette"]
        );
    }

    #[test]
    fn loose_list_falls_back_to_splitting() {
        assert_eq!(
            parse_terms("[Bento layout, 'Rounded corners',\n\"Neutral tones\"]", 10),
            vec!["Bento layout", "Rounded corners", "Neutral tones"]
        );
    }

    #[test]
    fn capped_at_max_terms() {
        let reply = r#"["a", "b", "c", "d"]"#;
        assert_eq!(parse_terms(reply, 2), vec!["a", "b"]);
    }

    #[test]
    fn other_json_and_blank_yield_nothing() {
        assert!(parse_terms("42", 10).is_empty());
        assert!(parse_terms(r#"{"keywords": ["x"]}"#, 10).is_empty());
        assert!(parse_terms("   ", 10).is_empty());
    }

    #[test]
    fn unfenced_text_is_trimmed() {
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
    }
}
