//! Markdown to a flat block model the DOCX writer can lay out
//!
//! Only what drafted responses actually use survives: headings, paragraphs
//! with bold runs, bullet and numbered items, pipe tables, code blocks and
//! Mermaid diagrams. Rules and raw HTML are dropped.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// A run of text, bold or plain
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: false }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Inline markup is stripped from heading text
    Heading { level: u8, text: String },
    Paragraph(Vec<Span>),
    ListItem {
        ordered: bool,
        /// Item number for ordered lists
        number: u64,
        /// 0 for top-level items
        depth: usize,
        spans: Vec<Span>,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Code { lang: String, text: String },
    Mermaid(String),
}

struct ItemState {
    ordered: bool,
    number: u64,
    depth: usize,
    emitted: bool,
}

#[derive(Default)]
struct TableState {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

/// Parse markdown into blocks
pub fn parse_markdown(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut spans: Vec<Span> = Vec::new();

    let mut bold_depth = 0usize;
    let mut heading: Option<u8> = None;
    // Next item number per open list; `None` for bullet lists
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut items: Vec<ItemState> = Vec::new();
    let mut table: Option<TableState> = None;
    let mut code: Option<(String, String)> = None;

    let parser = Parser::new_ext(content, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    flush_paragraph(&mut blocks, &mut spans);
                    heading = Some(level as u8);
                }
                Tag::Paragraph => {
                    if !items.is_empty() && !spans.is_empty() {
                        push_text(&mut spans, " ", false);
                    }
                }
                Tag::List(first) => {
                    flush_item(&mut blocks, &mut spans, &mut items);
                    lists.push(first);
                }
                Tag::Item => {
                    let depth = lists.len().saturating_sub(1);
                    let (ordered, number) = match lists.last_mut() {
                        Some(Some(next)) => {
                            let number = *next;
                            *next += 1;
                            (true, number)
                        }
                        _ => (false, 0),
                    };
                    items.push(ItemState { ordered, number, depth, emitted: false });
                }
                Tag::Strong => bold_depth += 1,
                Tag::Table(_) => {
                    flush_item(&mut blocks, &mut spans, &mut items);
                    table = Some(TableState::default());
                }
                Tag::TableCell => {
                    if let Some(table) = table.as_mut() {
                        table.cell.clear();
                    }
                }
                Tag::CodeBlock(kind) => {
                    // Text gathered so far belongs to the open item, if any
                    flush_item(&mut blocks, &mut spans, &mut items);
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) => lang.trim().to_lowercase(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    code = Some((lang, String::new()));
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => {
                    if let Some(level) = heading.take() {
                        let text = spans_text(&spans).trim().to_string();
                        spans.clear();
                        if !text.is_empty() {
                            blocks.push(Block::Heading { level, text });
                        }
                    }
                }
                TagEnd::Paragraph => {
                    if items.is_empty() {
                        flush_paragraph(&mut blocks, &mut spans);
                    }
                }
                TagEnd::Item => {
                    flush_item(&mut blocks, &mut spans, &mut items);
                    items.pop();
                }
                TagEnd::List(_) => {
                    lists.pop();
                }
                TagEnd::Strong => bold_depth = bold_depth.saturating_sub(1),
                TagEnd::TableCell => {
                    if let Some(table) = table.as_mut() {
                        let cell = std::mem::take(&mut table.cell);
                        table.row.push(cell.trim().to_string());
                    }
                }
                TagEnd::TableHead => {
                    if let Some(table) = table.as_mut() {
                        table.header = std::mem::take(&mut table.row);
                    }
                }
                TagEnd::TableRow => {
                    if let Some(table) = table.as_mut() {
                        let row = std::mem::take(&mut table.row);
                        table.rows.push(row);
                    }
                }
                TagEnd::Table => {
                    if let Some(table) = table.take() {
                        blocks.push(Block::Table {
                            header: table.header,
                            rows: table.rows,
                        });
                    }
                }
                TagEnd::CodeBlock => {
                    if let Some((lang, text)) = code.take() {
                        let text = text.trim_end().to_string();
                        if lang == "mermaid" {
                            blocks.push(Block::Mermaid(text));
                        } else {
                            blocks.push(Block::Code { lang, text });
                        }
                    }
                }
                _ => {}
            },
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, body)) = code.as_mut() {
                    body.push_str(&text);
                } else if let Some(table) = table.as_mut() {
                    table.cell.push_str(&text);
                } else {
                    push_text(&mut spans, &text, bold_depth > 0);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(table) = table.as_mut() {
                    table.cell.push(' ');
                } else {
                    push_text(&mut spans, " ", bold_depth > 0);
                }
            }
            // Horizontal rules and raw HTML have no place in the document
            _ => {}
        }
    }

    flush_item(&mut blocks, &mut spans, &mut items);
    flush_paragraph(&mut blocks, &mut spans);
    blocks
}

/// Upper-case the first character when it is a lowercase letter
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        _ => text.to_string(),
    }
}

fn push_text(spans: &mut Vec<Span>, text: &str, bold: bool) {
    if let Some(last) = spans.last_mut() {
        if last.bold == bold {
            last.text.push_str(text);
            return;
        }
    }
    spans.push(Span { text: text.to_string(), bold });
}

fn spans_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Trim the outer whitespace, drop empty runs and capitalize the opening letter
fn tidy(spans: Vec<Span>) -> Vec<Span> {
    let mut spans: Vec<Span> = spans.into_iter().filter(|s| !s.text.is_empty()).collect();
    if let Some(first) = spans.first_mut() {
        first.text = capitalize_first(first.text.trim_start());
    }
    if let Some(last) = spans.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    spans.retain(|s| !s.text.is_empty());
    spans
}

fn flush_paragraph(blocks: &mut Vec<Block>, spans: &mut Vec<Span>) {
    let tidied = tidy(std::mem::take(spans));
    if !tidied.is_empty() {
        blocks.push(Block::Paragraph(tidied));
    }
}

fn flush_item(blocks: &mut Vec<Block>, spans: &mut Vec<Span>, items: &mut [ItemState]) {
    let tidied = tidy(std::mem::take(spans));
    let Some(item) = items.last_mut() else {
        if !tidied.is_empty() {
            blocks.push(Block::Paragraph(tidied));
        }
        return;
    };
    if tidied.is_empty() || item.emitted {
        if !tidied.is_empty() {
            blocks.push(Block::Paragraph(tidied));
        }
        return;
    }
    item.emitted = true;
    blocks.push(Block::ListItem {
        ordered: item.ordered,
        number: item.number,
        depth: item.depth,
        spans: tidied,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_strip_inline_markup() {
        let blocks = parse_markdown("## **Delivery** `Approach`\n\nbody");
        assert_eq!(
            blocks[0],
            Block::Heading { level: 2, text: "Delivery Approach".to_string() }
        );
    }

    #[test]
    fn test_paragraph_bold_runs_and_capitalization() {
        let blocks = parse_markdown("we deliver **on time** and\non budget.");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                Span::plain("We deliver "),
                Span::bold("on time"),
                Span::plain(" and on budget."),
            ])]
        );
    }

    #[test]
    fn test_lists() {
        let blocks = parse_markdown("- first\n- second\n  - nested\n\n3. three\n4. four\n");
        assert_eq!(
            blocks,
            vec![
                Block::ListItem { ordered: false, number: 0, depth: 0, spans: vec![Span::plain("First")] },
                Block::ListItem { ordered: false, number: 0, depth: 0, spans: vec![Span::plain("Second")] },
                Block::ListItem { ordered: false, number: 0, depth: 1, spans: vec![Span::plain("Nested")] },
                Block::ListItem { ordered: true, number: 3, depth: 0, spans: vec![Span::plain("Three")] },
                Block::ListItem { ordered: true, number: 4, depth: 0, spans: vec![Span::plain("Four")] },
            ]
        );
    }

    #[test]
    fn test_table() {
        let blocks = parse_markdown("| Phase | Weeks |\n|---|---|\n| **Discovery** | 2 |\n| Build | 8 |\n");
        assert_eq!(
            blocks,
            vec![Block::Table {
                header: vec!["Phase".to_string(), "Weeks".to_string()],
                rows: vec![
                    vec!["Discovery".to_string(), "2".to_string()],
                    vec!["Build".to_string(), "8".to_string()],
                ],
            }]
        );
    }

    #[test]
    fn test_code_and_mermaid_blocks() {
        let blocks = parse_markdown("```mermaid\ngraph TD\n  A-->B\n```\n\n```json\n{\"a\": 1}\n```\n");
        assert_eq!(blocks[0], Block::Mermaid("graph TD\n  A-->B".to_string()));
        assert_eq!(
            blocks[1],
            Block::Code { lang: "json".to_string(), text: "{\"a\": 1}".to_string() }
        );
    }

    #[test]
    fn test_code_block_inside_list_item_keeps_bullet() {
        let blocks = parse_markdown("- deploy with:\n\n  ```bash\n  make deploy\n  ```\n- monitor\n");
        assert_eq!(
            blocks,
            vec![
                Block::ListItem { ordered: false, number: 0, depth: 0, spans: vec![Span::plain("Deploy with:")] },
                Block::Code { lang: "bash".to_string(), text: "make deploy".to_string() },
                Block::ListItem { ordered: false, number: 0, depth: 0, spans: vec![Span::plain("Monitor")] },
            ]
        );
    }

    #[test]
    fn test_rules_and_html_dropped() {
        let blocks = parse_markdown("Intro\n\n---\n\n<div>raw</div>\n\nOutro");
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph(vec![Span::plain("Intro")]),
                Block::Paragraph(vec![Span::plain("Outro")]),
            ]
        );
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("über"), "Über");
        assert_eq!(capitalize_first("Already"), "Already");
        assert_eq!(capitalize_first("1. item"), "1. item");
        assert_eq!(capitalize_first(""), "");
    }
}
