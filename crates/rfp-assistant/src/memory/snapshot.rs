//! Memory payloads: stage snapshots and sentence-level edit diffs

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::providers::ChatMessage;
use crate::text::truncate_chars;
use crate::types::{BuildQuery, ExtractionResult, RequirementItem, RequirementsResult, ScopeResult};

const EXCERPT_CHARS: usize = 4000;
const SOURCE_TEXT_CHARS: usize = 2000;
const QUERY_PREVIEW_CHARS: usize = 8000;
const MAX_SNAPSHOT_ITEMS: usize = 100;

/// A sentence the user rewrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceChange {
    pub original: String,
    pub edited: String,
}

/// Split text into sentences on `.`, `!` and `?` followed by whitespace, and on newlines
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Pair sentences by position and keep the pairs that differ.
/// Extra sentences on either side pair with an empty string.
pub fn sentence_changes(original: &str, edited: &str) -> Vec<SentenceChange> {
    let before = split_sentences(original);
    let after = split_sentences(edited);
    let len = before.len().max(after.len());

    (0..len)
        .filter_map(|i| {
            let o = before.get(i).cloned().unwrap_or_default();
            let e = after.get(i).cloned().unwrap_or_default();
            (o != e).then_some(SentenceChange {
                original: o,
                edited: e,
            })
        })
        .collect()
}

pub(crate) fn preprocess_messages(extraction: &ExtractionResult, scope: &ScopeResult) -> Vec<ChatMessage> {
    let summary = if extraction.key_requirements_summary.trim().is_empty() {
        "RFP preprocess summary"
    } else {
        extraction.key_requirements_summary.as_str()
    };

    let snapshot = json!({
        "key_requirements_summary": summary,
        "language": extraction.language,
        "cpv_codes": extraction.cpv_codes,
        "removed_text_length": scope.removed_text.chars().count(),
        "cleaned_text_excerpt": truncate_chars(&scope.essential_text, EXCERPT_CHARS),
    });

    vec![
        ChatMessage::user(summary),
        assistant(snapshot.to_string()),
    ]
}

pub(crate) fn requirements_messages(requirements: &RequirementsResult) -> Vec<ChatMessage> {
    let snapshot = json!({
        "summary": "RFP requirements snapshot",
        "solution_requirements_count": requirements.solution_requirements.len(),
        "response_structure_requirements_count": requirements.response_structure_requirements.len(),
        "solution_requirements": simplify(&requirements.solution_requirements),
        "response_structure_requirements": simplify(&requirements.response_structure_requirements),
        "notes": requirements.notes,
    });

    vec![
        ChatMessage::user("RFP REQUIREMENTS SNAPSHOT"),
        assistant(snapshot.to_string()),
    ]
}

pub(crate) fn build_query_messages(query: &BuildQuery) -> Vec<ChatMessage> {
    let snapshot = json!({
        "summary": "RFP build query snapshot",
        "solution_requirements_summary": truncate_chars(&query.solution_requirements_summary, EXCERPT_CHARS),
        "response_structure_requirements_summary": truncate_chars(&query.response_structure_requirements_summary, EXCERPT_CHARS),
        "query_preview": truncate_chars(&query.query_text, QUERY_PREVIEW_CHARS),
    });

    vec![
        ChatMessage::user("RFP BUILD QUERY SNAPSHOT"),
        assistant(snapshot.to_string()),
    ]
}

pub(crate) fn edit_messages(
    original: &str,
    edited: &str,
    requirement: Option<&str>,
    changes: &[SentenceChange],
) -> Vec<ChatMessage> {
    let payload = json!({
        "requirement": requirement.unwrap_or_default(),
        "original_excerpt": truncate_chars(original, EXCERPT_CHARS),
        "edited_excerpt": truncate_chars(edited, EXCERPT_CHARS),
        "sentence_changes": changes,
    });

    let prompt = match requirement {
        Some(req) if !req.trim().is_empty() => format!("USER EDIT FOR REQUIREMENT: {}", truncate_chars(req, 500)),
        _ => "USER EDIT".to_string(),
    };

    vec![ChatMessage::user(prompt), assistant(payload.to_string())]
}

fn simplify(items: &[RequirementItem]) -> Vec<serde_json::Value> {
    items
        .iter()
        .take(MAX_SNAPSHOT_ITEMS)
        .map(|item| {
            json!({
                "id": item.id,
                "type": item.requirement_type,
                "category": item.category,
                "source_text": truncate_chars(&item.source_text, SOURCE_TEXT_CHARS),
            })
        })
        .collect()
}

fn assistant(content: String) -> ChatMessage {
    ChatMessage {
        role: crate::providers::Role::Assistant,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("We deliver v1.2 on time. Really?\nYes!  Done");
        assert_eq!(sentences, vec!["We deliver v1.2 on time.", "Really?", "Yes!", "Done"]);
    }

    #[test]
    fn test_sentence_changes_positional() {
        let changes = sentence_changes(
            "We use pega. Support is 24/7. Bye.",
            "We use Pega. Support is 24/7.",
        );
        assert_eq!(
            changes,
            vec![
                SentenceChange {
                    original: "We use pega.".to_string(),
                    edited: "We use Pega.".to_string(),
                },
                SentenceChange {
                    original: "Bye.".to_string(),
                    edited: String::new(),
                },
            ]
        );
        assert!(sentence_changes("Same.", "Same.").is_empty());
    }

    #[test]
    fn test_requirements_snapshot_truncates() {
        let item = RequirementItem {
            id: "SOL-001".to_string(),
            requirement_type: "mandatory".to_string(),
            source_text: "x".repeat(5000),
            normalized_text: String::new(),
            category: "Tech".to_string(),
        };
        let requirements = RequirementsResult {
            solution_requirements: vec![item; 150],
            ..Default::default()
        };

        let messages = requirements_messages(&requirements);
        let snapshot: serde_json::Value = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(snapshot["solution_requirements_count"], 150);
        let items = snapshot["solution_requirements"].as_array().unwrap();
        assert_eq!(items.len(), MAX_SNAPSHOT_ITEMS);
        assert_eq!(items[0]["source_text"].as_str().unwrap().len(), SOURCE_TEXT_CHARS);
    }

    #[test]
    fn test_edit_messages_carry_changes() {
        let changes = sentence_changes("a b c.", "a B c.");
        let messages = edit_messages("a b c.", "a B c.", Some("REQ"), &changes);
        let payload: serde_json::Value = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(payload["sentence_changes"][0]["edited"], "a B c.");
        assert!(messages[0].content.contains("REQ"));
    }
}
