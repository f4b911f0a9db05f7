//! Build query and generated responses

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StructureDetectionResult;

/// Requirement id marking a single whole-document response
pub const STRUCTURED_RESPONSE_ID: &str = "STRUCTURED";

/// Consolidated input for response generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildQuery {
    /// Full prompt-ready query
    pub query_text: String,
    pub solution_requirements_summary: String,
    pub response_structure_requirements_summary: String,
    /// Language, classification codes and structure detection
    #[serde(default)]
    pub extraction_data: Map<String, Value>,
    /// Set once the user has reviewed the query
    #[serde(default)]
    pub confirmed: bool,
}

impl BuildQuery {
    /// Structure detection carried in `extraction_data`, if present and well-formed
    pub fn structure_detection(&self) -> Option<StructureDetectionResult> {
        self.extraction_data
            .get("structure_detection")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Detected language, `"unknown"` when absent
    pub fn language(&self) -> &str {
        self.extraction_data
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

/// Output of the response agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseResult {
    pub response_text: String,
    pub build_query_used: String,
    /// Memory snippets that fed the prompt
    pub num_retrieved_chunks: usize,
    #[serde(default)]
    pub notes: String,
}

/// A drafted answer for one requirement, or for the whole document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementResponse {
    pub requirement_id: String,
    pub requirement_text: String,
    pub response: String,
}

impl RequirementResponse {
    /// Whether this is a single whole-document response
    pub fn is_structured(&self) -> bool {
        self.requirement_id == STRUCTURED_RESPONSE_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(extraction_data: Value) -> BuildQuery {
        BuildQuery {
            query_text: "Text".to_string(),
            solution_requirements_summary: "Summary".to_string(),
            response_structure_requirements_summary: "Structure".to_string(),
            extraction_data: extraction_data.as_object().cloned().unwrap_or_default(),
            confirmed: false,
        }
    }

    #[test]
    fn test_build_query_defaults_unconfirmed() {
        let q: BuildQuery = serde_json::from_value(json!({
            "query_text": "Build query text",
            "solution_requirements_summary": "Solution summary",
            "response_structure_requirements_summary": "Structure summary",
            "extraction_data": {"language": "en"}
        }))
        .unwrap();
        assert!(!q.confirmed);
        assert_eq!(q.language(), "en");
        assert!(q.structure_detection().is_none());
    }

    #[test]
    fn test_structure_detection_from_extraction_data() {
        let q = query(json!({
            "structure_detection": {
                "has_explicit_structure": true,
                "structure_type": "explicit",
                "detected_sections": ["Executive Summary"],
                "structure_description": "",
                "confidence": 0.9
            }
        }));
        let detection = q.structure_detection().unwrap();
        assert!(detection.has_explicit_structure);
        assert_eq!(q.language(), "unknown");

        assert!(query(json!({"structure_detection": null})).structure_detection().is_none());
    }

    #[test]
    fn test_structured_marker() {
        let response = RequirementResponse {
            requirement_id: STRUCTURED_RESPONSE_ID.to_string(),
            requirement_text: String::new(),
            response: "# Response".to_string(),
        };
        assert!(response.is_structured());
    }
}
