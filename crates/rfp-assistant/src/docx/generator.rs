//! Proposal document writer
//!
//! Layout: front page (logo, title, date, company), table of contents,
//! company overview, then the drafted responses. A single whole-document
//! response is rendered as-is; otherwise each requirement gets its own
//! numbered section with the requirement text restated above the answer.

use docx_rs::{
    AlignmentType, BreakType, Docx, Footer, PageMargin, PageNum, Paragraph, Pic, Run, RunFonts,
    Shading, Style, StyleType, Table, TableCell, TableOfContents, TableRow, VAlignType, WidthType,
};
use image::ImageFormat;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{CompanyConfig, DocumentConfig};
use crate::error::{Error, Result};
use crate::mermaid::MermaidRenderer;
use crate::types::{ExtractionResult, RequirementItem, RequirementResponse};

use super::markdown::{capitalize_first, parse_markdown, Block, Span};

/// One inch in twentieths of a point
const INCH_TWIPS: i32 = 1440;
/// One inch in EMU
const INCH_EMU: u32 = 914_400;
/// EMU per pixel at 96 DPI
const PIXEL_EMU: u32 = 9_525;
/// Usable text width with 1" margins on Letter paper
const TEXT_WIDTH_TWIPS: usize = 9_360;
const CODE_FONT: &str = "Consolas";
const MUTED: &str = "646464";
const WHITE: &str = "FFFFFF";

/// Everything needed to render one proposal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentRequest {
    pub responses: Vec<RequirementResponse>,
    /// Used to fill in requirement text that a response left empty
    #[serde(default)]
    pub requirements: Vec<RequirementItem>,
    #[serde(default)]
    pub extraction: Option<ExtractionResult>,
    /// Front page title; defaults to the detected RFP language
    #[serde(default)]
    pub title: Option<String>,
}

impl DocumentRequest {
    pub fn new(responses: Vec<RequirementResponse>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    fn title(&self) -> String {
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        self.extraction
            .as_ref()
            .map(|e| e.language.trim())
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("unknown"))
            .map(str::to_uppercase)
            .unwrap_or_else(|| "RFP RESPONSE".to_string())
    }

    fn is_structured(&self) -> bool {
        self.responses.len() == 1 && self.responses[0].is_structured()
    }
}

/// Parsed response body, ready for layout
struct Section {
    requirement_id: String,
    requirement_text: String,
    blocks: Vec<Block>,
}

/// Rendered diagrams keyed by (section, block) index
type Diagrams = HashMap<(usize, usize), Vec<u8>>;

pub struct DocxGenerator {
    company: CompanyConfig,
    document: DocumentConfig,
    renderer: Option<Arc<dyn MermaidRenderer>>,
    logo: Option<Vec<u8>>,
}

impl DocxGenerator {
    pub fn new(
        company: CompanyConfig,
        document: DocumentConfig,
        renderer: Option<Arc<dyn MermaidRenderer>>,
    ) -> Self {
        let logo = document.logo_path.as_deref().and_then(load_logo);
        Self {
            company,
            document,
            renderer,
            logo,
        }
    }

    /// Render the proposal to DOCX bytes
    pub async fn generate(&self, request: &DocumentRequest) -> Result<Vec<u8>> {
        if request.responses.is_empty() {
            return Err(Error::BadRequest("No responses to export".to_string()));
        }

        let sections = self.sections(request);
        let diagrams = self.render_diagrams(&sections).await;
        let docx = self.build(request, &sections, &diagrams);

        let mut buffer = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut buffer)
            .map_err(|e| Error::Document(format!("Failed to pack DOCX: {}", e)))?;

        let bytes = buffer.into_inner();
        tracing::info!(
            "Generated DOCX: {} responses, {} diagrams, {} bytes",
            sections.len(),
            diagrams.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Render and write to `path`, creating parent directories
    pub async fn save_to(&self, request: &DocumentRequest, path: &Path) -> Result<PathBuf> {
        let bytes = self.generate(request).await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        tracing::info!("Saved DOCX to {}", path.display());
        Ok(path.to_path_buf())
    }

    fn sections(&self, request: &DocumentRequest) -> Vec<Section> {
        request
            .responses
            .iter()
            .map(|response| {
                let mut requirement_text = response.requirement_text.trim().to_string();
                if requirement_text.is_empty() {
                    if let Some(item) = request
                        .requirements
                        .iter()
                        .find(|r| r.id == response.requirement_id)
                    {
                        requirement_text = item.display_text().trim().to_string();
                    }
                }
                Section {
                    requirement_id: response.requirement_id.clone(),
                    requirement_text,
                    blocks: parse_markdown(&response.response),
                }
            })
            .collect()
    }

    /// Diagrams that fail to render stay out of the map and fall back to code
    async fn render_diagrams(&self, sections: &[Section]) -> Diagrams {
        let mut diagrams = Diagrams::new();
        let Some(renderer) = self.renderer.as_ref() else {
            return diagrams;
        };

        for (s, section) in sections.iter().enumerate() {
            for (b, block) in section.blocks.iter().enumerate() {
                let Block::Mermaid(code) = block else {
                    continue;
                };
                match renderer.render_png(code).await {
                    Ok(png) if png_dimensions(&png).is_some() => {
                        diagrams.insert((s, b), png);
                    }
                    Ok(_) => {
                        tracing::warn!("{} returned an unreadable PNG; keeping diagram as code", renderer.name());
                    }
                    Err(e) => {
                        tracing::warn!("Mermaid rendering failed, keeping diagram as code: {}", e);
                    }
                }
            }
        }
        diagrams
    }

    fn build(&self, request: &DocumentRequest, sections: &[Section], diagrams: &Diagrams) -> Docx {
        let font = self.document.font.as_str();
        let mut docx = Docx::new()
            .default_fonts(fonts(font))
            .default_size(22)
            .page_margin(
                PageMargin::new()
                    .top(INCH_TWIPS)
                    .bottom(INCH_TWIPS)
                    .left(INCH_TWIPS)
                    .right(INCH_TWIPS),
            )
            .footer(
                Footer::new().add_paragraph(
                    Paragraph::new()
                        .add_page_num(PageNum::new())
                        .align(AlignmentType::Center),
                ),
            );

        for (level, size) in [(1usize, 32usize), (2, 28), (3, 24), (4, 22)] {
            docx = docx.add_style(
                Style::new(format!("Heading{}", level), StyleType::Paragraph)
                    .name(format!("Heading {}", level))
                    .size(size)
                    .bold()
                    .color(self.document.accent_color.clone()),
            );
        }

        docx = self.front_page(docx, &request.title());

        docx = docx
            .add_paragraph(page_break())
            .add_paragraph(heading(1, "Table of Contents"))
            .add_table_of_contents(TableOfContents::new().heading_styles_range(1, 3));

        docx = docx
            .add_paragraph(page_break())
            .add_paragraph(heading(1, "Company Overview"));
        for paragraph in &self.company.overview {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(paragraph.trim())));
        }
        docx = docx.add_paragraph(page_break());

        if request.is_structured() {
            return self.blocks(docx, &sections[0].blocks, 0, diagrams);
        }

        docx = docx.add_paragraph(heading(1, "Solution Requirement Responses"));
        for (idx, section) in sections.iter().enumerate() {
            docx = docx
                .add_paragraph(heading(
                    2,
                    &format!("Requirement {}: {}", idx + 1, section.requirement_id),
                ))
                .add_paragraph(
                    Paragraph::new()
                        .add_run(Run::new().add_text("Requirement: ").bold())
                        .add_run(Run::new().add_text(capitalize_first(&section.requirement_text))),
                )
                .add_paragraph(heading(3, "Response"));
            docx = self.blocks(docx, &section.blocks, idx, diagrams);
            docx = docx.add_paragraph(Paragraph::new());
        }
        docx
    }

    fn front_page(&self, mut docx: Docx, title: &str) -> Docx {
        let accent = self.document.accent_color.as_str();

        if let Some(logo) = self.logo.as_deref() {
            if let Some((width, height)) = png_dimensions(logo) {
                let height_emu = INCH_EMU * 3 / 2;
                let width_emu = scale(width, height, height_emu);
                docx = docx.add_paragraph(
                    Paragraph::new()
                        .add_run(Run::new().add_image(
                            Pic::new_with_dimensions(logo.to_vec(), width, height)
                                .size(width_emu, height_emu),
                        ))
                        .align(AlignmentType::Center),
                );
            }
        }

        let title_size = match title.chars().count() {
            n if n > 80 => 48,
            n if n > 60 => 56,
            _ => 64,
        };
        let date = chrono::Local::now().format("%B %d, %Y").to_string();

        docx.add_paragraph(Paragraph::new())
            .add_paragraph(centered(
                Run::new().add_text(title).bold().size(title_size).color(accent),
            ))
            .add_paragraph(Paragraph::new())
            .add_paragraph(centered(Run::new().add_text(date).size(28).color(MUTED)))
            .add_paragraph(Paragraph::new())
            .add_paragraph(centered(
                Run::new()
                    .add_text(self.company.name.as_str())
                    .bold()
                    .size(40)
                    .color(accent),
            ))
            .add_paragraph(centered(
                Run::new()
                    .add_text(self.company.website.as_str())
                    .size(24)
                    .color(MUTED),
            ))
    }

    fn blocks(&self, mut docx: Docx, blocks: &[Block], section: usize, diagrams: &Diagrams) -> Docx {
        for (b, block) in blocks.iter().enumerate() {
            docx = match block {
                Block::Heading { level, text } => docx.add_paragraph(heading((*level).clamp(1, 4), text)),
                Block::Paragraph(spans) => docx.add_paragraph(runs(Paragraph::new(), spans)),
                Block::ListItem {
                    ordered,
                    number,
                    depth,
                    spans,
                } => {
                    let marker = if *ordered {
                        format!("{}. ", number)
                    } else {
                        "• ".to_string()
                    };
                    let indent = INCH_TWIPS / 4 * (*depth as i32 + 1);
                    let paragraph = Paragraph::new()
                        .indent(Some(indent), None, None, None)
                        .add_run(Run::new().add_text(marker));
                    docx.add_paragraph(runs(paragraph, spans))
                }
                Block::Table { header, rows } => match self.table(header, rows) {
                    Some(table) => docx.add_table(table).add_paragraph(Paragraph::new()),
                    None => docx,
                },
                Block::Code { text, .. } => docx.add_paragraph(code(text)),
                Block::Mermaid(source) => match diagrams.get(&(section, b)) {
                    Some(png) => docx.add_paragraph(diagram(png)),
                    None => docx.add_paragraph(code(source)),
                },
            };
        }
        docx
    }

    fn table(&self, header: &[String], rows: &[Vec<String>]) -> Option<Table> {
        let columns = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .filter(|&n| n > 0)?;
        let width = TEXT_WIDTH_TWIPS / columns;

        let mut table_rows = Vec::with_capacity(rows.len() + 1);
        if !header.is_empty() {
            let cells = (0..columns)
                .map(|i| {
                    let text = header.get(i).map(String::as_str).unwrap_or_default();
                    cell(width, Run::new().add_text(text).bold().color(WHITE))
                        .shading(Shading::new().fill(self.document.accent_color.as_str()))
                })
                .collect();
            table_rows.push(TableRow::new(cells));
        }
        for row in rows {
            let cells = (0..columns)
                .map(|i| {
                    let text = row.get(i).map(String::as_str).unwrap_or_default();
                    cell(width, Run::new().add_text(text))
                })
                .collect();
            table_rows.push(TableRow::new(cells));
        }

        Some(Table::new(table_rows).set_grid(vec![width; columns]))
    }
}

fn fonts(name: &str) -> RunFonts {
    RunFonts::new().ascii(name).hi_ansi(name).east_asia(name).cs(name)
}

fn heading(level: u8, text: &str) -> Paragraph {
    Paragraph::new()
        .style(&format!("Heading{}", level))
        .add_run(Run::new().add_text(text))
}

fn centered(run: Run) -> Paragraph {
    Paragraph::new().add_run(run).align(AlignmentType::Center)
}

fn page_break() -> Paragraph {
    Paragraph::new().add_run(Run::new().add_break(BreakType::Page))
}

fn runs(mut paragraph: Paragraph, spans: &[Span]) -> Paragraph {
    for span in spans {
        let run = Run::new().add_text(span.text.as_str());
        paragraph = paragraph.add_run(if span.bold { run.bold() } else { run });
    }
    paragraph
}

fn cell(width: usize, run: Run) -> TableCell {
    TableCell::new()
        .add_paragraph(Paragraph::new().add_run(run))
        .width(width, WidthType::Dxa)
        .vertical_align(VAlignType::Top)
}

fn code(text: &str) -> Paragraph {
    let mut run = Run::new().fonts(fonts(CODE_FONT)).size(20);
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }
    Paragraph::new().add_run(run)
}

/// Embedded at natural size, shrunk to fit the text width
fn diagram(png: &[u8]) -> Paragraph {
    let mut paragraph = Paragraph::new().align(AlignmentType::Center);
    if let Some((width, height)) = png_dimensions(png) {
        let max_width = INCH_EMU * 6;
        let natural = width.saturating_mul(PIXEL_EMU);
        let (w, h) = if natural > max_width {
            (max_width, scale(height, width, max_width))
        } else {
            (natural, height.saturating_mul(PIXEL_EMU))
        };
        paragraph = paragraph.add_run(
            Run::new().add_image(Pic::new_with_dimensions(png.to_vec(), width, height).size(w, h)),
        );
    }
    paragraph
}

/// `target * numerator / denominator` without overflow
fn scale(numerator: u32, denominator: u32, target: u32) -> u32 {
    if denominator == 0 {
        return target;
    }
    (u64::from(target) * u64::from(numerator) / u64::from(denominator)) as u32
}

/// Width and height of a PNG that decodes in full.
///
/// Truncated or corrupt data yields `None`, so only images that Word can
/// display are ever embedded.
pub fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    match image::load_from_memory_with_format(data, ImageFormat::Png) {
        Ok(img) => {
            let (width, height) = (img.width(), img.height());
            (width > 0 && height > 0).then_some((width, height))
        }
        Err(e) => {
            tracing::debug!("Not a usable PNG: {}", e);
            None
        }
    }
}

fn load_logo(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) if png_dimensions(&bytes).is_some() => Some(bytes),
        Ok(_) => {
            tracing::warn!("Logo {} is not a readable PNG; front page will have no logo", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read logo {}: {}", path.display(), e);
            None
        }
    }
}
