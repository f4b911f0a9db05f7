//! Response agent: drafts the answer to a confirmed build query
//!
//! Before drafting, a clarity check decides whether prior requirement
//! memories are pulled into the prompt. Past user edits are always consulted
//! so recurring corrections (names, terminology) carry over.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::memory::{stage, MemoryClient, MemoryHit};
use crate::providers::{ChatRequest, LlmProvider};
use crate::text::{estimate_tokens, truncate_chars};
use crate::types::{BuildQuery, ResponseResult};

use super::json::{parse_llm_json, str_field, string_list};
use super::prompts;
use super::query::NO_STRUCTURE_REQUIREMENTS;

/// Section names that indicate a mandated document outline
const EXPLICIT_KEYWORDS: &[&str] = &[
    "executive summary",
    "technical approach",
    "implementation plan",
    "project plan",
    "methodology",
    "solution overview",
    "company overview",
    "chapter",
    "part",
    "appendix",
];

const UNCLEAR_MARKERS: &[&str] = &["unclear", "not clear", "need", "clarif", "missing", "ambigu"];

pub const TRUNCATION_MARKER: &str = "\n\n[Response truncated for length]";

const KNOWLEDGE_QUERY_CHARS: usize = 300;
const KNOWLEDGE_CONTEXT_CHARS: usize = 600;
const MEMORY_PIECE_CHARS: usize = 1000;
const EDIT_FALLBACK_CHARS: usize = 1500;
const MAX_EDIT_CHANGES: usize = 10;
const MAX_CLARITY_QUESTIONS: usize = 6;
/// Tokens kept free for the completion on top of the estimated prompt
const RESPONSE_HEADROOM_TOKENS: i64 = 1000;

const RULE: &str = "================================================================================";

/// Length profile of a drafted response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Short answer per requirement (implicit or no structure)
    Brief,
    /// Long answer covering a mandated document outline
    Comprehensive,
}

impl ResponseMode {
    pub fn target_chars(self) -> (usize, usize) {
        match self {
            Self::Brief => (200, 500),
            Self::Comprehensive => (5000, 10000),
        }
    }

    /// Hard cap applied after generation
    pub fn max_chars(self) -> usize {
        self.target_chars().1
    }

    fn token_ceiling(self) -> i64 {
        match self {
            Self::Brief => 200,
            Self::Comprehensive => 2500,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Brief => "implicit",
            Self::Comprehensive => "explicit",
        }
    }
}

/// Inputs of one response-agent call
pub struct ResponseRequest<'a> {
    pub build_query: &'a BuildQuery,
    pub knowledge_base: Option<&'a KnowledgeBase>,
    /// Answered clarifying questions, `Q: ...\nA: ...` blocks
    pub qa_context: Option<&'a str>,
    pub memory: &'a MemoryClient,
    pub company: &'a str,
    pub context_window_tokens: i64,
    /// Per-stage memory search limit
    pub memory_results: usize,
    pub temperature: f32,
    /// Overrides the mode-derived completion budget
    pub max_tokens: Option<u32>,
}

impl<'a> ResponseRequest<'a> {
    /// Request with default budgets and no optional context
    pub fn new(build_query: &'a BuildQuery, memory: &'a MemoryClient, company: &'a str) -> Self {
        Self {
            build_query,
            knowledge_base: None,
            qa_context: None,
            memory,
            company,
            context_window_tokens: 32769,
            memory_results: 3,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Outcome of the clarity check
#[derive(Debug, Clone, PartialEq)]
pub struct Clarity {
    pub clear: bool,
    pub questions: Vec<String>,
}

impl Clarity {
    fn unclear(questions: Vec<String>) -> Self {
        Self {
            clear: false,
            questions,
        }
    }
}

/// Pick the response mode from the detection result, else from section keywords
pub fn response_mode(build_query: &BuildQuery) -> ResponseMode {
    if let Some(detection) = build_query.structure_detection() {
        tracing::info!(
            "Using structure detection from extraction_data: has_explicit_structure={}, type={:?}",
            detection.has_explicit_structure,
            detection.structure_type
        );
        return if detection.has_explicit_structure {
            ResponseMode::Comprehensive
        } else {
            ResponseMode::Brief
        };
    }

    let summary = build_query.response_structure_requirements_summary.trim();
    let lower = summary.to_lowercase();
    let has_sections = EXPLICIT_KEYWORDS.iter().any(|k| lower.contains(k));
    let implicit = summary.is_empty() || summary == NO_STRUCTURE_REQUIREMENTS || !has_sections;
    tracing::info!(
        "Detected structure from summary: implicit={}, has_explicit_sections={}, summary_length={}",
        implicit,
        has_sections,
        summary.len()
    );
    if implicit {
        ResponseMode::Brief
    } else {
        ResponseMode::Comprehensive
    }
}

/// Ask the model whether the requirement can be answered without extra context.
/// A failed call counts as unclear.
pub async fn clarity_check(
    llm: &dyn LlmProvider,
    requirement_text: &str,
    structure_text: Option<&str>,
) -> Clarity {
    if requirement_text.trim().is_empty() {
        return Clarity::unclear(vec!["Requirement text is empty".to_string()]);
    }

    let request = ChatRequest::new(
        prompts::CLARITY_SYSTEM,
        prompts::clarity_user(requirement_text, structure_text),
    )
    .with_max_tokens(300)
    .json();

    match llm.chat(&request).await {
        Ok(reply) => {
            tracing::debug!("Clarity check raw output: {}", truncate_chars(&reply, 2000));
            parse_clarity(&reply)
        }
        Err(e) => {
            tracing::warn!("Clarity check LLM call failed: {}", e);
            Clarity::unclear(Vec::new())
        }
    }
}

/// JSON verdict when present, otherwise a keyword heuristic over the reply
fn parse_clarity(reply: &str) -> Clarity {
    if let Ok(map) = parse_llm_json(reply) {
        let mut verdict = str_field(&map, "clarity");
        if verdict.is_empty() {
            verdict = str_field(&map, "status");
        }
        let verdict = verdict.to_lowercase();
        let clear = match verdict.as_str() {
            "clear" => true,
            "unclear" | "" => false,
            other => other.contains("yes") || (other.contains("clear") && !other.contains("unclear")),
        };
        let questions = match map.get("questions") {
            Some(Value::Null) | None => string_list(map.get("clarifying_questions")),
            questions => string_list(questions),
        };
        return Clarity { clear, questions };
    }

    let lower = reply.to_lowercase();
    if UNCLEAR_MARKERS.iter().any(|m| lower.contains(m)) {
        let questions = reply
            .lines()
            .map(str::trim)
            .filter(|l| l.ends_with('?'))
            .take(MAX_CLARITY_QUESTIONS)
            .map(str::to_string)
            .collect();
        Clarity::unclear(questions)
    } else {
        Clarity {
            clear: true,
            questions: Vec::new(),
        }
    }
}

/// Draft a response for a confirmed build query
pub async fn run_response_agent(
    llm: &dyn LlmProvider,
    request: &ResponseRequest<'_>,
) -> Result<ResponseResult> {
    let query = request.build_query;
    if !query.confirmed {
        return Err(Error::BadRequest(
            "Build query must be confirmed before generating response".to_string(),
        ));
    }

    tracing::info!("Response agent: starting (query_length={})", query.query_text.len());

    let knowledge_context = request
        .knowledge_base
        .map(|kb| {
            let context = kb.format_for_prompt(truncate_chars(
                &query.solution_requirements_summary,
                KNOWLEDGE_QUERY_CHARS,
            ));
            if context.chars().count() > KNOWLEDGE_CONTEXT_CHARS {
                format!("{}...", truncate_chars(&context, KNOWLEDGE_CONTEXT_CHARS))
            } else {
                context
            }
        })
        .unwrap_or_default();

    let requirement = query.solution_requirements_summary.as_str();
    let structure = query.response_structure_requirements_summary.as_str();
    let mode = response_mode(query);

    let clarity = clarity_check(
        llm,
        requirement,
        Some(structure).filter(|s| !s.trim().is_empty()),
    )
    .await;
    tracing::info!(
        "Clarity check result: {} (questions={})",
        if clarity.clear { "clear" } else { "unclear" },
        clarity.questions.len()
    );

    let memories = if clarity.clear {
        tracing::debug!("Skipping memory retrieval; requirement considered clear");
        Vec::new()
    } else {
        let hits = request
            .memory
            .search_memories(requirement, request.memory_results, Some(stage::REQUIREMENTS))
            .await;
        if !hits.is_empty() {
            tracing::info!(
                "Included {} memory snippets after clarity check ({})",
                hits.len(),
                describe_hits(&hits)
            );
        }
        hits
    };

    let edit_query = if requirement.trim().is_empty() {
        query.query_text.as_str()
    } else {
        requirement
    };
    let edit_memories = request
        .memory
        .search_memories(edit_query, request.memory_results, Some(stage::EDIT_MEMORY))
        .await;
    if !edit_memories.is_empty() {
        tracing::info!(
            "Included {} edit memories ({})",
            edit_memories.len(),
            describe_hits(&edit_memories)
        );
    }

    let system = prompts::response_system(request.company);
    let user = response_prompt(
        requirement,
        structure,
        &knowledge_context,
        &memories,
        &edit_memories,
        request.qa_context,
        mode,
        request.company,
    );

    let input_tokens = (estimate_tokens(&system) + estimate_tokens(&user) + 100) as i64;
    let max_tokens = match request.max_tokens {
        Some(max_tokens) => max_tokens,
        None => {
            let budget = mode
                .token_ceiling()
                .min(request.context_window_tokens - input_tokens - RESPONSE_HEADROOM_TOKENS);
            if budget < 1 {
                return Err(Error::BadRequest(format!(
                    "Prompt of ~{} tokens leaves no room for a response in a {}-token context window",
                    input_tokens, request.context_window_tokens
                )));
            }
            budget as u32
        }
    };
    let (min_chars, max_chars) = mode.target_chars();
    tracing::info!(
        "Response agent: calling {} (input_tokens={}, max_tokens={}, target={}-{} chars, structure={})",
        llm.model(),
        input_tokens,
        max_tokens,
        min_chars,
        max_chars,
        mode.label()
    );

    let chat = ChatRequest::new(system, user)
        .with_temperature(request.temperature)
        .with_max_tokens(max_tokens);
    let raw = llm.chat(&chat).await?;
    // The cap applies to the raw reply; whitespace is tidied afterwards
    let response_text = truncate_response(&raw, mode.max_chars()).trim().to_string();

    tracing::info!(
        "Response agent: finished (response_length={}, max_allowed={}, structure={})",
        response_text.chars().count(),
        mode.max_chars(),
        mode.label()
    );

    Ok(ResponseResult {
        response_text,
        build_query_used: query.query_text.clone(),
        num_retrieved_chunks: memories.len(),
        notes: "Generated response".to_string(),
    })
}

/// Cap `text` at `max_chars`, preferring a sentence or line boundary in the last 20%
pub fn truncate_response(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    tracing::warn!("Response too long, truncating to {} chars", max_chars);

    let truncated = truncate_chars(text, max_chars);
    let kept = match truncated.rfind(|c: char| c == '.' || c == '\n') {
        Some(cut) if truncated[..cut].chars().count() as f64 > max_chars as f64 * 0.8 => {
            &truncated[..=cut]
        }
        _ => truncated,
    };
    format!("{}{}", kept, TRUNCATION_MARKER)
}

fn describe_hits(hits: &[MemoryHit]) -> String {
    hits.iter()
        .map(|h| format!("{}:{:.3}", truncate_chars(&h.user_id, 12), h.score))
        .collect::<Vec<_>>()
        .join(",")
}

#[allow(clippy::too_many_arguments)]
fn response_prompt(
    requirement: &str,
    structure: &str,
    knowledge_context: &str,
    memories: &[MemoryHit],
    edit_memories: &[MemoryHit],
    qa_context: Option<&str>,
    mode: ResponseMode,
    company: &str,
) -> String {
    let mut parts: Vec<String> = vec![
        "REQUIREMENT TO ADDRESS:".to_string(),
        requirement.to_string(),
        String::new(),
    ];

    if !structure.trim().is_empty() && structure != NO_STRUCTURE_REQUIREMENTS {
        parts.push("NOTE: Response structure requirements (formatting/style guidance only):".to_string());
        parts.push(structure.to_string());
        parts.push(
            "These are for overall document formatting - do NOT add sections like 'Executive Summary' to individual requirement responses."
                .to_string(),
        );
        parts.push(String::new());
    }

    if !knowledge_context.is_empty() {
        parts.push(format!("{} CONTEXT: {}", company.to_uppercase(), knowledge_context));
        parts.push(String::new());
    }

    if !memories.is_empty() {
        parts.push(RULE.to_string());
        parts.push("LOCAL MEMORY - Relevant snippets (use as additional context):".to_string());
        parts.push(RULE.to_string());
        for hit in memories {
            let piece = if hit.snippet.is_empty() {
                let joined: String = hit.messages.iter().take(2).map(|m| m.content.as_str()).collect();
                truncate_chars(&joined, MEMORY_PIECE_CHARS).to_string()
            } else {
                hit.snippet.clone()
            };
            parts.push(format!("MEMORY (score={:.3}): {}", hit.score, piece));
            parts.push(String::new());
        }
    }

    if !edit_memories.is_empty() {
        parts.push(RULE.to_string());
        parts.push("USER EDIT MEMORIES - Learn from past corrections (CRITICAL - apply these patterns):".to_string());
        parts.push(RULE.to_string());
        for hit in edit_memories {
            parts.extend(edit_memory_lines(hit));
        }
    }

    if let Some(qa) = qa_context.filter(|qa| !qa.trim().is_empty()) {
        parts.extend(
            [
                RULE,
                "USER-PROVIDED INFORMATION (CRITICAL - MUST USE FULL DETAILS):",
                RULE,
                qa,
                "",
                "CRITICAL INSTRUCTIONS FOR USING Q&A INFORMATION:",
                "- The Q&A above contains SPECIFIC, DETAILED information that the user provided about their solution.",
                "- You MUST use the FULL, COMPLETE answers from the Q&A - do NOT summarize or condense them.",
                "- If a question asks about previous projects, certifications, team structure or capabilities, use the full details provided in the answer.",
                "- Integrate the complete information naturally throughout your response - do NOT reduce it to one sentence.",
                "- Match the depth and detail level of the Q&A answers in your response.",
                "",
            ]
            .map(str::to_string),
        );
    }

    let (min_chars, max_chars) = mode.target_chars();
    match mode {
        ResponseMode::Brief => {
            parts.extend([
                "TASK: Write a brief, direct response to the requirement above (approximately 5 sentences).".to_string(),
                String::new(),
                "YOUR RESPONSE SHOULD:".to_string(),
                "1. Directly answer the requirement - be specific and concrete".to_string(),
                "2. Use Q&A information if provided - include relevant details but keep it concise".to_string(),
                format!("3. Reference {} capabilities where relevant - one brief example is sufficient", company),
                format!("4. Be brief: Write approximately 3-5 sentences ({}-{} characters total)", min_chars, max_chars),
                String::new(),
                "DO NOT INCLUDE:".to_string(),
                "- Long explanations or elaborations".to_string(),
                "- Multiple examples or case studies".to_string(),
                "- Section headers or formatting".to_string(),
                "- Unnecessary background information".to_string(),
                String::new(),
                format!("Write your brief response now ({}-{} characters, ~5 sentences):", min_chars, max_chars),
            ]);
        }
        ResponseMode::Comprehensive => {
            parts.extend([
                "TASK: Write a comprehensive, detailed response to the requirement above.".to_string(),
                String::new(),
                "YOUR RESPONSE SHOULD:".to_string(),
                "1. Show understanding: Briefly acknowledge what the requirement asks for".to_string(),
                "2. Comprehensive answer: Provide a detailed, thorough response addressing ALL aspects of the requirement".to_string(),
                "3. Use Q&A information FULLY: if Q&A context is provided above, use the complete answers and match their depth".to_string(),
                "4. Be specific: Include concrete details, metrics, capabilities, and examples".to_string(),
                format!("5. Be relevant: Use {} capabilities, case studies, or accelerators where applicable", company),
                format!("6. Be detailed: Write 800-1500 words ({}-{} characters)", min_chars, max_chars),
                String::new(),
                "DO NOT INCLUDE:".to_string(),
                "- Executive summaries".to_string(),
                "- Solution overviews".to_string(),
                "- Generic introductions or conclusions".to_string(),
                "- Unnecessary section headers - just answer the requirement directly".to_string(),
                String::new(),
                format!("Write your comprehensive response now (detailed, {}-{} characters):", min_chars, max_chars),
            ]);
        }
    }

    parts.join("\n")
}

/// Prompt lines for one edit memory
fn edit_memory_lines(hit: &MemoryHit) -> Vec<String> {
    let Some(changes) = hit.sentence_changes() else {
        let raw: String = hit.messages.iter().map(|m| m.content.as_str()).collect();
        let raw = if raw.is_empty() { hit.snippet.as_str() } else { raw.as_str() };
        return vec![
            format!(
                "EDIT MEMORY (score={:.3}): {}",
                hit.score,
                truncate_chars(raw, EDIT_FALLBACK_CHARS)
            ),
            String::new(),
        ];
    };
    if changes.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![
        format!("EDIT MEMORY (score={:.3}):", hit.score),
        "The user previously corrected these sentences:".to_string(),
    ];
    for change in changes.iter().take(MAX_EDIT_CHANGES) {
        if change.original.is_empty() || change.edited.is_empty() {
            continue;
        }
        lines.push(format!("  Original: {}", change.original));
        lines.push(format!("  Corrected: {}", change.edited));
        lines.push(String::new());
    }
    lines.extend(
        [
            "IMPORTANT: Apply similar corrections in your response. Pay attention to:",
            "  - Capitalization of names, terms, and proper nouns",
            "  - Specific terminology the user prefers",
            "  - Content additions or modifications the user made",
            "",
        ]
        .map(str::to_string),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LocalMemoryStore;
    use crate::providers::ScriptedLlm;
    use crate::types::{StructureDetectionResult, StructureType};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn query(structure: &str, confirmed: bool) -> BuildQuery {
        BuildQuery {
            query_text: "Full build query".to_string(),
            solution_requirements_summary: "Integrate with Salesforce CRM".to_string(),
            response_structure_requirements_summary: structure.to_string(),
            extraction_data: Map::new(),
            confirmed,
        }
    }

    fn response_call(llm: &ScriptedLlm) -> ChatRequest {
        llm.calls()
            .into_iter()
            .find(|r| r.system_prompt().contains("response agent"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unconfirmed_query_is_rejected() {
        let llm = ScriptedLlm::new();
        let memory = MemoryClient::disabled();
        let q = query(NO_STRUCTURE_REQUIREMENTS, false);
        let err = run_response_agent(&llm, &ResponseRequest::new(&q, &memory, "Acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(llm.calls().is_empty());
    }

    #[test]
    fn test_response_mode_heuristic() {
        assert_eq!(response_mode(&query(NO_STRUCTURE_REQUIREMENTS, true)), ResponseMode::Brief);
        assert_eq!(response_mode(&query("", true)), ResponseMode::Brief);
        assert_eq!(response_mode(&query("Use Arial 11pt", true)), ResponseMode::Brief);
        assert_eq!(
            response_mode(&query("Chapter 1 must be the Executive Summary", true)),
            ResponseMode::Comprehensive
        );
    }

    #[test]
    fn test_response_mode_prefers_detection() {
        let mut q = query("Chapter 1 must be the Executive Summary", true);
        let detection =
            StructureDetectionResult::new(false, StructureType::Implicit, vec![], "", 0.7).unwrap();
        q.extraction_data
            .insert("structure_detection".to_string(), serde_json::to_value(detection).unwrap());
        assert_eq!(response_mode(&q), ResponseMode::Brief);
    }

    #[test]
    fn test_parse_clarity() {
        let clear = parse_clarity(r#"{"clarity": "Clear", "questions": []}"#);
        assert!(clear.clear);

        let status = parse_clarity(r#"{"status": "unclear", "clarifying_questions": "Which CRM?"}"#);
        assert!(!status.clear);
        assert_eq!(status.questions, vec!["Which CRM?"]);

        let prose = parse_clarity("The requirement is ambiguous.\nWhich CRM edition?\nWhat volume?");
        assert!(!prose.clear);
        assert_eq!(prose.questions.len(), 2);

        assert!(parse_clarity("Looks fine to me.").clear);
    }

    #[test]
    fn test_truncate_response() {
        assert_eq!(truncate_response("short", 500), "short");

        let text = format!("{}. {}", "a".repeat(450), "b".repeat(100));
        let truncated = truncate_response(&text, 500);
        assert!(truncated.starts_with(&format!("{}.", "a".repeat(450))));
        assert!(!truncated.contains('b'));
        assert!(truncated.ends_with(TRUNCATION_MARKER));

        let no_boundary = "x".repeat(600);
        let truncated = truncate_response(&no_boundary, 500);
        assert_eq!(truncated.len(), 500 + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn test_brief_response_when_clear() {
        let llm = ScriptedLlm::new()
            .on("clarity checker", r#"{"clarity": "clear", "questions": []}"#)
            .on("response agent", "We integrate natively with Salesforce.");
        let memory = MemoryClient::disabled();
        let q = query(NO_STRUCTURE_REQUIREMENTS, true);

        let result = run_response_agent(&llm, &ResponseRequest::new(&q, &memory, "Acme"))
            .await
            .unwrap();
        assert_eq!(result.response_text, "We integrate natively with Salesforce.");
        assert_eq!(result.build_query_used, "Full build query");
        assert_eq!(result.num_retrieved_chunks, 0);
        assert_eq!(result.notes, "Generated response");

        let call = response_call(&llm);
        assert_eq!(call.max_tokens, Some(200));
        assert!(!call.user_prompt().contains("NOTE: Response structure requirements"));
        assert!(call.user_prompt().contains("Write your brief response now (200-500"));
    }

    #[tokio::test]
    async fn test_comprehensive_response_is_truncated() {
        let long = format!("{}.", "word ".repeat(2500));
        let llm = ScriptedLlm::new()
            .on("clarity checker", r#"{"clarity": "clear"}"#)
            .on("response agent", long);
        let memory = MemoryClient::disabled();
        let mut q = query("Sections: Executive Summary, Technical Approach", true);
        let detection =
            StructureDetectionResult::new(true, StructureType::Explicit, vec![], "", 0.9).unwrap();
        q.extraction_data
            .insert("structure_detection".to_string(), json!(detection));

        let result = run_response_agent(&llm, &ResponseRequest::new(&q, &memory, "Acme"))
            .await
            .unwrap();
        assert!(result.response_text.ends_with(TRUNCATION_MARKER));
        assert!(result.response_text.chars().count() <= 10000 + TRUNCATION_MARKER.len());
        assert_eq!(response_call(&llm).max_tokens, Some(2500));
    }

    #[tokio::test]
    async fn test_cap_counts_raw_reply() {
        // 501 raw chars: over the brief cap even though the trimmed text is not
        let padded = format!("{}  ", "x".repeat(499));
        let llm = ScriptedLlm::new()
            .on("clarity checker", r#"{"clarity": "clear"}"#)
            .on("response agent", padded);
        let memory = MemoryClient::disabled();
        let q = query(NO_STRUCTURE_REQUIREMENTS, true);

        let result = run_response_agent(&llm, &ResponseRequest::new(&q, &memory, "Acme"))
            .await
            .unwrap();
        assert_eq!(
            result.response_text,
            format!("{} {}", "x".repeat(499), TRUNCATION_MARKER)
        );
    }

    #[tokio::test]
    async fn test_unclear_requirement_pulls_memories() {
        let store = Arc::new(LocalMemoryStore::in_memory());
        let memory = MemoryClient::new(Some(store));
        let requirements = crate::types::RequirementsResult {
            solution_requirements: vec![crate::types::RequirementItem {
                id: "SOL-001".to_string(),
                requirement_type: "mandatory".to_string(),
                source_text: "Integrate with Salesforce CRM".to_string(),
                normalized_text: String::new(),
                category: "Integration".to_string(),
            }],
            ..Default::default()
        };
        assert!(memory.store_requirements_result("previous rfp", &requirements).await);
        assert_eq!(
            memory
                .store_edit_memory(
                    "We use salesforce connectors.",
                    "We use Salesforce connectors.",
                    Some("Integrate with Salesforce CRM"),
                )
                .await,
            Some(1)
        );

        let llm = ScriptedLlm::new()
            .fail_on("clarity checker", "timeout")
            .on("response agent", "Drafted.");
        let q = query(NO_STRUCTURE_REQUIREMENTS, true);

        let result = run_response_agent(&llm, &ResponseRequest::new(&q, &memory, "Acme"))
            .await
            .unwrap();
        assert_eq!(result.num_retrieved_chunks, 1);

        let prompt = response_call(&llm).user_prompt().to_string();
        assert!(prompt.contains("LOCAL MEMORY - Relevant snippets"));
        assert!(prompt.contains("  Original: We use salesforce connectors."));
        assert!(prompt.contains("  Corrected: We use Salesforce connectors."));
    }

    #[tokio::test]
    async fn test_qa_and_knowledge_context_in_prompt() {
        let kb: KnowledgeBase = serde_json::from_value(json!({
            "capabilities": [{"name": "CRM Integration", "description": "Salesforce connectors", "keywords": ["salesforce"]}]
        }))
        .unwrap();
        let llm = ScriptedLlm::new()
            .on("clarity checker", r#"{"clarity": "clear"}"#)
            .on("response agent", "Done.");
        let memory = MemoryClient::disabled();
        let q = query(NO_STRUCTURE_REQUIREMENTS, true);
        let mut request = ResponseRequest::new(&q, &memory, "Acme");
        request.knowledge_base = Some(&kb);
        request.qa_context = Some("Q: Which CRM?\nA: Salesforce Enterprise");

        run_response_agent(&llm, &request).await.unwrap();
        let prompt = response_call(&llm).user_prompt().to_string();
        assert!(prompt.contains("ACME CONTEXT: Capabilities:\n- CRM Integration"));
        assert!(prompt.contains("USER-PROVIDED INFORMATION (CRITICAL - MUST USE FULL DETAILS):"));
        assert!(prompt.contains("A: Salesforce Enterprise"));
    }

    #[tokio::test]
    async fn test_prompt_exceeding_context_window_is_rejected() {
        let llm = ScriptedLlm::new().on("clarity checker", r#"{"clarity": "clear"}"#);
        let memory = MemoryClient::disabled();
        let q = query(NO_STRUCTURE_REQUIREMENTS, true);
        let mut request = ResponseRequest::new(&q, &memory, "Acme");
        request.context_window_tokens = 500;

        let err = run_response_agent(&llm, &request).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(llm.count_calls("response agent"), 0);
    }
}
