//! LLM-backed agents for each pipeline stage

pub mod extraction;
pub mod json;
pub mod prompts;
pub mod query;
pub mod questions;
pub mod requirements;
pub mod response;
pub mod scope;
pub mod structure;

pub use extraction::run_extraction_agent;
pub use json::parse_llm_json;
pub use query::{build_query, NO_SOLUTION_REQUIREMENTS, NO_STRUCTURE_REQUIREMENTS};
pub use questions::generate_questions;
pub use requirements::run_requirements_agent;
pub use response::{
    clarity_check, response_mode, run_response_agent, truncate_response, Clarity, ResponseMode,
    ResponseRequest, TRUNCATION_MARKER,
};
pub use scope::run_scope_agent;
pub use structure::detect_structure;
