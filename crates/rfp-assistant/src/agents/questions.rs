//! Clarifying questions for the bid team

use serde_json::Value;

use crate::error::Result;
use crate::providers::{ChatRequest, LlmProvider};
use crate::types::{BuildQuery, Question};

use super::json::{parse_llm_json, str_field};
use super::prompts;

/// Ask the model for at most `max_questions` clarifying questions, numbered `Q1`, `Q2`, ...
pub async fn generate_questions(
    llm: &dyn LlmProvider,
    build_query: &BuildQuery,
    max_questions: usize,
) -> Result<Vec<Question>> {
    if max_questions == 0 {
        return Ok(Vec::new());
    }

    let request = ChatRequest::new(
        prompts::QUESTIONS_SYSTEM,
        prompts::questions_user(
            &build_query.solution_requirements_summary,
            &build_query.response_structure_requirements_summary,
            max_questions,
        ),
    )
    .with_temperature(0.3)
    .json();

    let content = llm.chat(&request).await?;
    let raw = parse_llm_json(&content)?;

    let Some(Value::Array(items)) = raw.get("questions") else {
        tracing::warn!("Question agent returned no questions array");
        return Ok(Vec::new());
    };

    let mut questions = Vec::new();
    for item in items {
        if questions.len() == max_questions {
            break;
        }
        let (text, map) = match item {
            Value::String(text) => (text.trim().to_string(), None),
            Value::Object(map) => (str_field(map, "question_text"), Some(map)),
            _ => continue,
        };
        if text.is_empty() {
            continue;
        }

        let field = |key: &str| map.map(|m| str_field(m, key)).unwrap_or_default();
        let priority = match field("priority").to_lowercase().as_str() {
            p @ ("high" | "low") => p.to_string(),
            _ => "medium".to_string(),
        };
        let requirement_id = Some(field("requirement_id"))
            .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case("null"));

        questions.push(Question {
            question_id: format!("Q{}", questions.len() + 1),
            question_text: text,
            context: field("context"),
            category: field("category").to_lowercase(),
            priority,
            requirement_id,
            answered: false,
        });
    }

    tracing::info!("Question agent: generated {} questions", questions.len());
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedLlm;
    use serde_json::Map;

    fn query() -> BuildQuery {
        BuildQuery {
            query_text: "query".to_string(),
            solution_requirements_summary: "- [SOL-001] Support SSO".to_string(),
            response_structure_requirements_summary: "None".to_string(),
            extraction_data: Map::new(),
            confirmed: false,
        }
    }

    #[tokio::test]
    async fn test_questions_are_numbered_and_capped() {
        let llm = ScriptedLlm::new().on(
            "clarification agent",
            r#"{"questions": [
                {"question_text": "Which IdP do you use?", "priority": "HIGH", "requirement_id": "SOL-001", "category": "Technical"},
                {"question_text": ""},
                "Any reference projects?",
                {"question_text": "Pricing model?", "requirement_id": null}
            ]}"#,
        );

        let questions = generate_questions(&llm, &query(), 2).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question_id, "Q1");
        assert_eq!(questions[0].priority, "high");
        assert_eq!(questions[0].category, "technical");
        assert_eq!(questions[0].requirement_id.as_deref(), Some("SOL-001"));
        assert_eq!(questions[1].question_id, "Q2");
        assert_eq!(questions[1].question_text, "Any reference projects?");
        assert_eq!(questions[1].priority, "medium");
        assert!(questions[1].requirement_id.is_none());
    }

    #[tokio::test]
    async fn test_zero_questions_skips_llm() {
        let llm = ScriptedLlm::new();
        assert!(generate_questions(&llm, &query(), 0).await.unwrap().is_empty());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_array_gives_empty_list() {
        let llm = ScriptedLlm::new().on("clarification agent", r#"{"note": "nothing to ask"}"#);
        assert!(generate_questions(&llm, &query(), 5).await.unwrap().is_empty());
    }
}
