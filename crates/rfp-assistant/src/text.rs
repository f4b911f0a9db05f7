//! Small text helpers shared across modules

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "what", "the", "and", "for", "are", "how", "does", "can", "will", "this", "that", "with",
    "from", "its", "which", "shall", "must", "should", "have", "has", "any", "all", "not", "our",
    "your", "their", "they", "them", "been", "was", "were", "into", "also", "such", "may",
];

/// Lowercased, de-duplicated keywords longer than two characters, stopwords removed.
/// Order of first occurrence is kept.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// First `max_chars` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Rough token estimate used for prompt budgeting (4 chars per token)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords("The CRM system SHALL integrate with the CRM, and SSO.");
        assert_eq!(keywords, vec!["crm", "system", "integrate", "sso"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
