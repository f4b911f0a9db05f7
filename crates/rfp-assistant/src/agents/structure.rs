//! Structure detection: does the RFP mandate explicit response sections?

use serde_json::{Map, Value};

use crate::providers::{ChatRequest, LlmProvider};
use crate::types::{RequirementItem, StructureDetectionResult, StructureType};

use super::json::{parse_llm_json, str_field, string_list};
use super::prompts;

/// Analyse response-structure requirements.
///
/// Never fails: LLM or parse errors yield a "no structure" result with zero
/// confidence and the failure in the description.
pub async fn detect_structure(
    llm: &dyn LlmProvider,
    requirements: &[RequirementItem],
) -> StructureDetectionResult {
    if requirements.is_empty() {
        tracing::info!("Structure detection: no response structure requirements found");
        return StructureDetectionResult::no_structure(
            "No response structure requirements found in RFP.",
            1.0,
        );
    }

    tracing::info!(
        "Structure detection: analyzing {} response structure requirements",
        requirements.len()
    );

    let request = ChatRequest::new(prompts::STRUCTURE_SYSTEM, prompts::structure_user(requirements))
        .with_max_tokens(1000)
        .json();

    let raw = match llm.chat(&request).await.and_then(|content| parse_llm_json(&content)) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("Structure detection failed: {}", e);
            return StructureDetectionResult::no_structure(
                format!("Structure detection failed: {}", e),
                0.0,
            );
        }
    };

    let result = reconcile(&raw);
    tracing::info!(
        "Structure detection: explicit={}, type={:?}, sections={}, confidence={:.2}",
        result.has_explicit_structure,
        result.structure_type,
        result.detected_sections.len(),
        result.confidence
    );
    result
}

/// Resolve contradictions between the flag and the type, clamp confidence
fn reconcile(raw: &Map<String, Value>) -> StructureDetectionResult {
    let mut has_explicit = raw
        .get("has_explicit_structure")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut structure_type = StructureType::from_label(&str_field(raw, "structure_type"));
    let detected_sections = match raw.get("detected_sections") {
        Some(list @ Value::Array(_)) => string_list(Some(list)),
        _ => Vec::new(),
    };
    let confidence = raw
        .get("confidence")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .unwrap_or(0.5);

    if has_explicit {
        structure_type = StructureType::Explicit;
    } else if structure_type == StructureType::Explicit {
        has_explicit = false;
        structure_type = if detected_sections.is_empty() {
            StructureType::None
        } else {
            StructureType::Implicit
        };
    }

    let mut description = str_field(raw, "structure_description");
    if description.is_empty() {
        description = "No explicit structure detected.".to_string();
    }

    StructureDetectionResult {
        has_explicit_structure: has_explicit,
        structure_type,
        detected_sections,
        structure_description: description,
        confidence: if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) },
    }
}
