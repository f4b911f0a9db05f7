//! Scope agent: trims the RFP to the content that needs answering

use crate::error::Result;
use crate::providers::{ChatRequest, LlmProvider};
use crate::types::ScopeResult;

use super::json::{parse_llm_json, str_field};
use super::prompts;

/// Split RFP text into essential and removed content.
/// An empty essential text from the model keeps the full input.
pub async fn run_scope_agent(llm: &dyn LlmProvider, text: &str) -> Result<ScopeResult> {
    let request = ChatRequest::new(prompts::SCOPE_SYSTEM, prompts::scope_user(text)).json();

    let content = llm.chat(&request).await?;
    let raw = parse_llm_json(&content)?;

    let mut essential_text = str_field(&raw, "essential_text");
    let mut rationale = str_field(&raw, "rationale");
    if essential_text.is_empty() {
        tracing::warn!("Scope agent returned no essential text; keeping the full RFP text");
        essential_text = text.trim().to_string();
        if rationale.is_empty() {
            rationale = "Model returned no essential text; full text kept.".to_string();
        }
    }

    Ok(ScopeResult {
        essential_text,
        removed_text: str_field(&raw, "removed_text"),
        rationale,
    })
}
