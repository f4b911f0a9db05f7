//! Lenient parsing of JSON objects out of LLM replies

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::text::truncate_chars;

/// Parse the JSON object in an LLM reply.
///
/// Strips markdown fences, tries strict parsing, then the outermost `{...}` span.
pub fn parse_llm_json(content: &str) -> Result<Map<String, Value>> {
    let cleaned = content.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(cleaned) {
        return Ok(map);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return Ok(map);
            }
        }
    }

    Err(Error::llm(format!(
        "Could not parse JSON from model output: {}",
        truncate_chars(cleaned, 200)
    )))
}

/// String field, empty when missing or not a string
pub(crate) fn str_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// List of strings; a bare string becomes a one-element list, anything else is empty
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_json() {
        let map = parse_llm_json("```json\n{\"language\": \"en\"}\n```").unwrap();
        assert_eq!(map["language"], "en");
    }

    #[test]
    fn test_parse_json_with_prose() {
        let map = parse_llm_json("Here you go: {\"a\": {\"b\": 1}} hope that helps").unwrap();
        assert_eq!(map["a"]["b"], 1);
    }

    #[test]
    fn test_parse_failure_is_llm_error() {
        assert!(matches!(parse_llm_json("no json here"), Err(Error::Llm(_))));
        assert!(parse_llm_json("[1, 2]").is_err());
    }

    #[test]
    fn test_string_list() {
        assert_eq!(string_list(Some(&json!(["a", " ", 3, null]))), vec!["a", "3"]);
        assert_eq!(string_list(Some(&json!("single"))), vec!["single"]);
        assert!(string_list(Some(&json!({"x": 1}))).is_empty());
        assert!(string_list(None).is_empty());
    }
}
