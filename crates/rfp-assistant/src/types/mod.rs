//! Core types shared by the agents, the pipeline and the HTTP layer

mod conversation;
mod extraction;
mod query;
mod requirements;

pub use conversation::{Answer, ConversationContext, Question};
pub use extraction::{ExtractionResult, PipelineOutput, ScopeResult};
pub use query::{BuildQuery, RequirementResponse, ResponseResult, STRUCTURED_RESPONSE_ID};
pub use requirements::{
    RequirementItem, RequirementsResult, StructureDetectionResult, StructureType,
};
