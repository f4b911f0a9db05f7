//! rfp-assistant: RFP response drafting service
//!
//! Uploaded RFP documents are turned into text, run through a fixed sequence
//! of LLM agents (extraction, scope, requirements, structure detection,
//! response drafting) with context from a semantic memory of earlier runs and
//! user edits, and rendered as a formatted DOCX proposal.

pub mod agents;
pub mod config;
pub mod docx;
pub mod error;
pub mod ingestion;
pub mod knowledge;
pub mod memory;
pub mod mermaid;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod storage;
pub mod text;
pub mod types;

pub use config::RfpConfig;
pub use docx::{DocumentRequest, DocxGenerator};
pub use error::{Error, Result};
pub use pipeline::{DraftOutput, RfpPipeline};
pub use types::{
    BuildQuery, ExtractionResult, PipelineOutput, RequirementItem, RequirementResponse,
    RequirementsResult, ScopeResult, StructureDetectionResult,
};
