//! Extraction and scope stage outputs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RequirementsResult;

/// Language and classification codes detected in the RFP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    /// ISO language code, `"unknown"` when undetected
    pub language: String,
    /// Text translated to English, when translation was requested
    #[serde(default)]
    pub translated_text: String,
    /// Common Procurement Vocabulary codes
    #[serde(default)]
    pub cpv_codes: Vec<String>,
    /// Other classification codes (UNSPSC, NAICS, ...)
    #[serde(default)]
    pub other_codes: Vec<String>,
    /// Short bullet summary of key requirements
    #[serde(default)]
    pub key_requirements_summary: String,
    /// The model's full JSON answer
    #[serde(default)]
    pub raw_structured: Map<String, Value>,
}

impl ExtractionResult {
    /// Result with only a language set
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            translated_text: String::new(),
            cpv_codes: Vec::new(),
            other_codes: Vec::new(),
            key_requirements_summary: String::new(),
            raw_structured: Map::new(),
        }
    }
}

/// RFP text reduced to the parts that matter for drafting a response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScopeResult {
    /// Content kept for requirement analysis
    pub essential_text: String,
    /// Boilerplate removed (legal, submission logistics, ...)
    #[serde(default)]
    pub removed_text: String,
    /// Why the content was removed
    #[serde(default)]
    pub rationale: String,
}

/// Output of the preprocessing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub extraction: ExtractionResult,
    pub scope: ScopeResult,
    pub requirements: RequirementsResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_defaults() {
        let result: ExtractionResult = serde_json::from_str(r#"{"language":"en"}"#).unwrap();
        assert_eq!(result.language, "en");
        assert_eq!(result.translated_text, "");
        assert!(result.raw_structured.is_empty());
        assert!(result.cpv_codes.is_empty());
    }

    #[test]
    fn test_pipeline_output_shape() {
        let output = PipelineOutput {
            extraction: ExtractionResult::new("de"),
            scope: ScopeResult {
                essential_text: "Essential".to_string(),
                ..Default::default()
            },
            requirements: RequirementsResult::default(),
        };

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["extraction"]["language"], "de");
        assert_eq!(value["scope"]["essential_text"], "Essential");
        assert!(value["requirements"]["solution_requirements"].is_array());
    }
}
