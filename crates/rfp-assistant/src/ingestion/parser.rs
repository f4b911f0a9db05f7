//! Native PDF and DOCX text extraction

use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::{Error, Result};

/// Document formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format
    Pdf,
    /// Office Open XML word processing document
    Docx,
    /// Legacy Word binary document
    Doc,
}

impl DocumentKind {
    /// Detect the kind from a filename extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            _ => None,
        }
    }

    /// Extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
        }
    }
}

/// Glyph names that leak into extracted PDF text, with their replacements
const GLYPH_REPLACEMENTS: &[(&str, &str)] = &[
    ("uni2010", "-"),
    ("uni2011", "-"),
    ("uni2013", "-"),
    ("uni2014", "--"),
    ("uni2018", "'"),
    ("uni2019", "'"),
    ("uni201C", "\""),
    ("uni201D", "\""),
    ("uni2022", "* "),
    ("uni2026", "..."),
    ("uni00A0", " "),
    ("f_f_i", "ffi"),
    ("f_f_l", "ffl"),
    ("f_i", "fi"),
    ("f_l", "fl"),
    ("f_f", "ff"),
];

/// Unicode punctuation and ligatures folded to ASCII
const CHAR_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2022}', "* "),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\0', ""),
];

/// Replace glyph names and typographic characters, drop blank lines
pub fn cleanup_pdf_text(text: &str) -> String {
    let mut result = text.to_string();

    for (glyph, replacement) in GLYPH_REPLACEMENTS {
        for pattern in [format!("({})", glyph), format!("<{}>", glyph)] {
            result = result.replace(&pattern, replacement);
        }
    }
    for (ch, replacement) in CHAR_REPLACEMENTS {
        result = result.replace(*ch, replacement);
    }

    result
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text pulled out of a document by a native parser
#[derive(Debug, Clone)]
pub struct ParsedText {
    /// Extracted text
    pub text: String,
    /// Total pages, when the format exposes them
    pub total_pages: Option<u32>,
}

/// Native (in-process) document parser
#[derive(Debug, Clone, Copy)]
pub struct FileParser {
    pdf_timeout: Duration,
}

impl Default for FileParser {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl FileParser {
    /// Create a parser with the given PDF extraction timeout
    pub fn new(pdf_timeout: Duration) -> Self {
        Self { pdf_timeout }
    }

    /// Extract text from a PDF. Returns empty text for image-only PDFs.
    pub fn parse_pdf(&self, filename: &str, data: &[u8]) -> Result<ParsedText> {
        let total_pages = lopdf::Document::load_mem(data)
            .ok()
            .map(|doc| doc.get_pages().len() as u32);

        let raw = match self.extract_pdf_with_timeout(data) {
            Some(text) if !text.trim().is_empty() => text,
            _ => Self::extract_pdf_text_fallback(filename, data)?,
        };

        Ok(ParsedText {
            text: cleanup_pdf_text(&raw),
            total_pages,
        })
    }

    /// Run pdf-extract on a worker thread; `None` on error or timeout
    fn extract_pdf_with_timeout(&self, data: &[u8]) -> Option<String> {
        use std::sync::mpsc;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let _ = tx.send(pdf_extract::extract_text_from_mem(&data_vec));
        });

        match rx.recv_timeout(self.pdf_timeout) {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                tracing::warn!("pdf-extract failed: {}, trying lopdf fallback", e);
                None
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The worker cannot be cancelled; it is left to finish on its own
                tracing::error!(
                    "PDF extraction timed out after {:?}, trying lopdf fallback",
                    self.pdf_timeout
                );
                None
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("PDF extraction thread panicked");
                None
            }
        }
    }

    /// Read text-show operators straight out of the page content streams
    fn extract_pdf_text_fallback(filename: &str, data: &[u8]) -> Result<String> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("Failed to load PDF: {}", e)))?;

        let mut text = String::new();
        for (page_num, page_id) in doc.get_pages() {
            match doc.get_page_content(page_id) {
                Ok(content) => {
                    let page_text = text_from_content_stream(&content);
                    if !page_text.trim().is_empty() {
                        text.push_str(&page_text);
                        text.push('\n');
                    }
                }
                Err(e) => tracing::debug!("No content for page {}: {}", page_num, e),
            }
        }

        if text.trim().is_empty() {
            tracing::warn!("{} has no text layer; it may be image-based", filename);
        }
        Ok(text)
    }

    /// Extract paragraph and table text from a DOCX
    pub fn parse_docx(&self, filename: &str, data: &[u8]) -> Result<ParsedText> {
        let docx = docx_rs::read_docx(data)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut lines = Vec::new();
        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
                docx_rs::DocumentChild::Table(table) => table_lines(table, &mut lines),
                _ => {}
            }
        }

        let text = lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ParsedText {
            text,
            total_pages: None,
        })
    }
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

/// One line per table row, cells separated by " | "
fn table_lines(table: &docx_rs::Table, lines: &mut Vec<String>) {
    for row_child in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row_child;
        let mut cells = Vec::new();
        for cell_child in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell_child;
            let cell_text = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                    _ => None,
                })
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            cells.push(cell_text);
        }
        if cells.iter().any(|c| !c.trim().is_empty()) {
            lines.push(cells.join(" | "));
        }
    }
}

/// Pull literal strings from `Tj`/`TJ` operators inside BT/ET blocks
fn text_from_content_stream(content: &[u8]) -> String {
    let content = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content.lines().map(str::trim) {
        match line {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                text.push(' ');
            }
            _ if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) => {
                if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                    if start < end {
                        let literal = line[start + 1..end]
                            .replace("\\(", "(")
                            .replace("\\)", ")")
                            .replace("\\n", "\n")
                            .replace("\\\\", "\\");
                        text.push_str(&literal);
                    }
                }
            }
            _ => {}
        }
    }

    text
}

/// SHA-256 hex digest of text
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
