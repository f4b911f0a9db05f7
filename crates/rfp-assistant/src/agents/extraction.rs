//! Extraction agent: language and classification codes

use crate::error::Result;
use crate::providers::{ChatRequest, LlmProvider};
use crate::types::ExtractionResult;

use super::json::{parse_llm_json, str_field, string_list};
use super::prompts;

/// Detect language, CPV and other codes, and summarise key requirements
pub async fn run_extraction_agent(llm: &dyn LlmProvider, text: &str) -> Result<ExtractionResult> {
    let request = ChatRequest::new(prompts::EXTRACTION_SYSTEM, prompts::extraction_user(text))
        .with_max_tokens(2000)
        .json();

    let content = llm.chat(&request).await?;
    tracing::debug!("Extraction agent raw output: {}", crate::text::truncate_chars(&content, 500));
    let raw = parse_llm_json(&content)?;

    let language = match str_field(&raw, "language").to_lowercase() {
        lang if lang.is_empty() => "unknown".to_string(),
        lang => lang,
    };

    Ok(ExtractionResult {
        language,
        translated_text: String::new(),
        cpv_codes: string_list(raw.get("cpv_codes")),
        other_codes: string_list(raw.get("other_codes")),
        key_requirements_summary: summary_text(raw.get("key_requirements_summary")),
        raw_structured: raw,
    })
}

/// The summary may come back as a string or a list of bullets
fn summary_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::Array(_)) => string_list(value)
            .into_iter()
            .map(|line| {
                if line.starts_with('-') {
                    line
                } else {
                    format!("- {}", line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedLlm;

    #[tokio::test]
    async fn test_extraction_parses_codes() {
        let llm = ScriptedLlm::new().on(
            "extraction agent",
            r#"```json
            {"language": "DE", "cpv_codes": ["72000000-5"], "other_codes": "NUTS DE21",
             "key_requirements_summary": ["CRM platform", "- 24/7 support"]}
            ```"#,
        );

        let result = run_extraction_agent(&llm, "Ausschreibung").await.unwrap();
        assert_eq!(result.language, "de");
        assert_eq!(result.cpv_codes, vec!["72000000-5"]);
        assert_eq!(result.other_codes, vec!["NUTS DE21"]);
        assert_eq!(result.key_requirements_summary, "- CRM platform\n- 24/7 support");
        assert!(result.raw_structured.contains_key("cpv_codes"));
    }

    #[tokio::test]
    async fn test_extraction_defaults_language() {
        let llm = ScriptedLlm::new().on("extraction agent", r#"{"cpv_codes": []}"#);
        let result = run_extraction_agent(&llm, "text").await.unwrap();
        assert_eq!(result.language, "unknown");
        assert_eq!(result.key_requirements_summary, "");
    }

    #[tokio::test]
    async fn test_extraction_unparseable_output_fails() {
        let llm = ScriptedLlm::new().on("extraction agent", "I cannot help with that");
        assert!(run_extraction_agent(&llm, "text").await.is_err());
    }
}
