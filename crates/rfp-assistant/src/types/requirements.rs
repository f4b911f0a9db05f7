//! Requirement classification and response-structure detection

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// A single requirement lifted from the RFP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementItem {
    /// Stable id such as `SOL-001` or `RESP-002`
    pub id: String,
    /// Obligation level ("mandatory", "optional", "informational", ...)
    #[serde(rename = "type", default)]
    pub requirement_type: String,
    /// Verbatim RFP text
    pub source_text: String,
    /// Condensed restatement
    #[serde(default)]
    pub normalized_text: String,
    /// Free-form category ("Technical", "Security", ...)
    #[serde(default)]
    pub category: String,
}

impl RequirementItem {
    /// Text to show or answer: the normalized form, else the source
    pub fn display_text(&self) -> &str {
        if self.normalized_text.trim().is_empty() {
            &self.source_text
        } else {
            &self.normalized_text
        }
    }
}

/// Requirements split by what they constrain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementsResult {
    /// What the proposed solution must do
    #[serde(default)]
    pub solution_requirements: Vec<RequirementItem>,
    /// How the response document must be organised
    #[serde(default)]
    pub response_structure_requirements: Vec<RequirementItem>,
    #[serde(default)]
    pub notes: String,
    /// Set when structure detection ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_detection: Option<StructureDetectionResult>,
}

/// Kind of response structure the RFP asks for
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StructureType {
    /// Named sections the response must follow
    Explicit,
    /// Hints at an order but no mandated sections
    Implicit,
    #[default]
    None,
}

impl StructureType {
    /// Parse a model-supplied label, unknown labels become `None`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "explicit" => Self::Explicit,
            "implicit" => Self::Implicit,
            _ => Self::None,
        }
    }
}

/// Whether the RFP mandates an explicit response outline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructureDetectionResult {
    pub has_explicit_structure: bool,
    pub structure_type: StructureType,
    #[serde(default)]
    pub detected_sections: Vec<String>,
    #[serde(default)]
    pub structure_description: String,
    /// Model confidence in [0, 1]
    #[serde(deserialize_with = "unit_interval")]
    pub confidence: f64,
}

impl StructureDetectionResult {
    /// Build a result, rejecting confidence outside [0, 1]
    pub fn new(
        has_explicit_structure: bool,
        structure_type: StructureType,
        detected_sections: Vec<String>,
        structure_description: impl Into<String>,
        confidence: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::BadRequest(format!(
                "confidence must be between 0 and 1, got {}",
                confidence
            )));
        }
        Ok(Self {
            has_explicit_structure,
            structure_type,
            detected_sections,
            structure_description: structure_description.into(),
            confidence,
        })
    }

    /// Result used when there is nothing to analyse or analysis failed
    pub(crate) fn no_structure(description: impl Into<String>, confidence: f64) -> Self {
        Self {
            has_explicit_structure: false,
            structure_type: StructureType::None,
            detected_sections: Vec::new(),
            structure_description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

fn unit_interval<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "confidence must be between 0 and 1, got {}",
            value
        )))
    }
}
