//! Requirements agent: solution vs response-structure requirements

use serde_json::Value;

use crate::error::Result;
use crate::providers::{ChatRequest, LlmProvider};
use crate::types::{RequirementItem, RequirementsResult};

use super::json::{parse_llm_json, str_field};
use super::prompts;

/// Classify essential RFP text into requirement lists
pub async fn run_requirements_agent(
    llm: &dyn LlmProvider,
    essential_text: &str,
) -> Result<RequirementsResult> {
    let request =
        ChatRequest::new(prompts::REQUIREMENTS_SYSTEM, prompts::requirements_user(essential_text))
            .json();

    let content = llm.chat(&request).await?;
    let raw = parse_llm_json(&content)?;

    let result = RequirementsResult {
        solution_requirements: normalize_items(raw.get("solution_requirements"), "SOL"),
        response_structure_requirements: normalize_items(
            raw.get("response_structure_requirements"),
            "RESP",
        ),
        notes: str_field(&raw, "notes"),
        structure_detection: None,
    };

    tracing::info!(
        "Requirements agent: {} solution, {} response-structure requirements",
        result.solution_requirements.len(),
        result.response_structure_requirements.len()
    );
    Ok(result)
}

/// Drop items without source text, fill missing ids and normalized text
fn normalize_items(value: Option<&Value>, prefix: &str) -> Vec<RequirementItem> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(map) = item else {
            continue;
        };
        let source_text = str_field(map, "source_text");
        if source_text.is_empty() {
            continue;
        }

        let mut id = str_field(map, "id");
        if id.is_empty() {
            id = format!("{}-{:03}", prefix, out.len() + 1);
        }
        let mut normalized_text = str_field(map, "normalized_text");
        if normalized_text.is_empty() {
            normalized_text = source_text.clone();
        }

        out.push(RequirementItem {
            id,
            requirement_type: str_field(map, "type").to_lowercase(),
            source_text,
            normalized_text,
            category: str_field(map, "category"),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedLlm;
    use serde_json::json;

    #[test]
    fn test_normalize_items() {
        let items = normalize_items(
            Some(&json!([
                {"id": "", "type": "Mandatory", "source_text": "Provide SSO", "category": "Security"},
                {"id": "SOL-009", "source_text": "", "normalized_text": "dropped"},
                "not an object",
                {"source_text": "Offer training", "normalized_text": "Training"}
            ])),
            "SOL",
        );

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "SOL-001");
        assert_eq!(items[0].requirement_type, "mandatory");
        assert_eq!(items[0].normalized_text, "Provide SSO");
        assert_eq!(items[1].id, "SOL-002");
        assert_eq!(items[1].normalized_text, "Training");
        assert!(normalize_items(Some(&json!("x")), "SOL").is_empty());
    }

    #[tokio::test]
    async fn test_requirements_agent() {
        let llm = ScriptedLlm::new().on(
            "requirements agent",
            r#"{"solution_requirements": [{"id": "SOL-001", "type": "mandatory", "source_text": "The system shall support SSO."}],
                "response_structure_requirements": [{"source_text": "Use the attached template."}],
                "notes": "ok"}"#,
        );
        let result = run_requirements_agent(&llm, "essential").await.unwrap();
        assert_eq!(result.solution_requirements[0].id, "SOL-001");
        assert_eq!(result.response_structure_requirements[0].id, "RESP-001");
        assert_eq!(result.notes, "ok");
        assert!(result.structure_detection.is_none());
    }
}
