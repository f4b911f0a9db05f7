//! Build query: deterministic assembly of the response-generation input

use serde_json::{json, Map, Value};

use crate::text::truncate_chars;
use crate::types::{
    BuildQuery, ExtractionResult, RequirementItem, RequirementsResult, ScopeResult, StructureType,
};

pub const NO_STRUCTURE_REQUIREMENTS: &str = "No response structure requirements found.";
pub const NO_SOLUTION_REQUIREMENTS: &str = "No solution requirements found.";

/// Characters of essential RFP text appended to the query
const ESSENTIAL_CONTEXT_CHARS: usize = 6000;

/// Combine the stage outputs into an unconfirmed [`BuildQuery`]
pub fn build_query(
    extraction: &ExtractionResult,
    scope: &ScopeResult,
    requirements: &RequirementsResult,
) -> BuildQuery {
    let solution_summary =
        summarize(&requirements.solution_requirements).unwrap_or_else(|| NO_SOLUTION_REQUIREMENTS.to_string());
    let structure_summary = summarize(&requirements.response_structure_requirements)
        .unwrap_or_else(|| NO_STRUCTURE_REQUIREMENTS.to_string());

    let mut sections = vec![
        format!("RFP LANGUAGE: {}", extraction.language),
        format!("CPV CODES: {}", codes(&extraction.cpv_codes)),
        format!("OTHER CODES: {}", codes(&extraction.other_codes)),
    ];
    if !extraction.key_requirements_summary.trim().is_empty() {
        sections.push(format!(
            "KEY REQUIREMENTS SUMMARY:\n{}",
            extraction.key_requirements_summary.trim()
        ));
    }
    sections.push(format!("SOLUTION REQUIREMENTS:\n{}", solution_summary));
    sections.push(format!("RESPONSE STRUCTURE REQUIREMENTS:\n{}", structure_summary));

    if let Some(detection) = &requirements.structure_detection {
        let kind = match detection.structure_type {
            StructureType::Explicit => "explicit",
            StructureType::Implicit => "implicit",
            StructureType::None => "none",
        };
        let mut line = format!(
            "DETECTED RESPONSE STRUCTURE: {} (confidence {:.2})",
            kind, detection.confidence
        );
        if !detection.detected_sections.is_empty() {
            line.push_str(&format!("\nRequired sections: {}", detection.detected_sections.join("; ")));
        }
        if !detection.structure_description.is_empty() {
            line.push_str(&format!("\n{}", detection.structure_description));
        }
        sections.push(line);
    }

    let essential = scope.essential_text.trim();
    if !essential.is_empty() {
        sections.push(format!(
            "ESSENTIAL RFP CONTENT:\n{}",
            truncate_chars(essential, ESSENTIAL_CONTEXT_CHARS)
        ));
    }

    let mut extraction_data = Map::new();
    extraction_data.insert("language".to_string(), json!(extraction.language));
    extraction_data.insert("cpv_codes".to_string(), json!(extraction.cpv_codes));
    extraction_data.insert("other_codes".to_string(), json!(extraction.other_codes));
    extraction_data.insert(
        "structure_detection".to_string(),
        requirements
            .structure_detection
            .as_ref()
            .and_then(|d| serde_json::to_value(d).ok())
            .unwrap_or(Value::Null),
    );

    BuildQuery {
        query_text: sections.join("\n\n"),
        solution_requirements_summary: solution_summary,
        response_structure_requirements_summary: structure_summary,
        extraction_data,
        confirmed: false,
    }
}

/// One line per requirement, `None` when the list is empty
fn summarize(items: &[RequirementItem]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            let mut tags = Vec::new();
            if !item.requirement_type.is_empty() {
                tags.push(item.requirement_type.as_str());
            }
            if !item.category.is_empty() {
                tags.push(item.category.as_str());
            }
            if tags.is_empty() {
                format!("- [{}] {}", item.id, item.display_text())
            } else {
                format!("- [{}] ({}) {}", item.id, tags.join(", "), item.display_text())
            }
        })
        .collect();
    Some(lines.join("\n"))
}

fn codes(codes: &[String]) -> String {
    if codes.is_empty() {
        "none".to_string()
    } else {
        codes.join(", ")
    }
}
