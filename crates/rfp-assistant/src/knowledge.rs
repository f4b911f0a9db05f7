//! Company knowledge base: capabilities, case studies and accelerators

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::text::extract_keywords;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseStudy {
    pub title: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub outcomes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accelerator {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Company material used to ground drafted responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub case_studies: Vec<CaseStudy>,
    #[serde(default)]
    pub accelerators: Vec<Accelerator>,
}

impl KnowledgeBase {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let kb: Self = serde_json::from_str(&data).map_err(|e| {
            Error::Config(format!("Invalid knowledge base {}: {}", path.display(), e))
        })?;
        tracing::info!(
            "Loaded knowledge base: {} capabilities, {} case studies, {} accelerators",
            kb.capabilities.len(),
            kb.case_studies.len(),
            kb.accelerators.len()
        );
        Ok(kb)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.case_studies.is_empty() && self.accelerators.is_empty()
    }

    /// Compact context block of the entries most relevant to `requirement`.
    /// Empty when nothing overlaps.
    pub fn format_for_prompt(&self, requirement: &str) -> String {
        let query: HashSet<String> = extract_keywords(requirement).into_iter().collect();
        if query.is_empty() {
            return String::new();
        }

        let mut sections = Vec::new();

        let capabilities = top_matches(&query, &self.capabilities, 3, |c| {
            format!("{} {} {}", c.name, c.description, c.keywords.join(" "))
        });
        if !capabilities.is_empty() {
            let lines: Vec<String> = capabilities
                .iter()
                .map(|c| format!("- {}: {}", c.name, c.description))
                .collect();
            sections.push(format!("Capabilities:\n{}", lines.join("\n")));
        }

        let case_studies = top_matches(&query, &self.case_studies, 2, |c| {
            format!("{} {} {} {}", c.title, c.client, c.summary, c.outcomes.join(" "))
        });
        if !case_studies.is_empty() {
            let lines: Vec<String> = case_studies
                .iter()
                .map(|c| {
                    let client = if c.client.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", c.client)
                    };
                    format!("- {}{}: {}", c.title, client, c.summary)
                })
                .collect();
            sections.push(format!("Case studies:\n{}", lines.join("\n")));
        }

        let accelerators = top_matches(&query, &self.accelerators, 2, |a| {
            format!("{} {}", a.name, a.description)
        });
        if !accelerators.is_empty() {
            let lines: Vec<String> = accelerators
                .iter()
                .map(|a| format!("- {}: {}", a.name, a.description))
                .collect();
            sections.push(format!("Accelerators:\n{}", lines.join("\n")));
        }

        sections.join("\n")
    }
}

/// Entries with at least one shared keyword, best overlap first
fn top_matches<'a, T>(
    query: &HashSet<String>,
    items: &'a [T],
    limit: usize,
    text: impl Fn(&T) -> String,
) -> Vec<&'a T> {
    let mut scored: Vec<(usize, usize, &T)> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let overlap = extract_keywords(&text(item))
                .iter()
                .filter(|k| query.contains(*k))
                .count();
            (overlap > 0).then_some((overlap, i, item))
        })
        .collect();

    // Stable on ties: earlier entries first
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(limit).map(|(_, _, item)| item).collect()
}
