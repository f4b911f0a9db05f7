//! Text extraction from uploaded RFP documents

pub mod external;
pub mod parser;

pub use external::ExternalTools;
pub use parser::{cleanup_pdf_text, hash_content, DocumentKind, FileParser};

use serde::Serialize;
use std::time::Duration;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};

/// How the text was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// pdf-extract or the lopdf fallback
    PdfText,
    /// pdftoppm + tesseract
    Ocr,
    /// docx-rs reader
    Docx,
    /// LibreOffice conversion followed by the docx-rs reader
    ConvertedDoc,
}

/// Result of text extraction
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    /// Extracted plain text
    pub text: String,
    /// Page count, when known
    pub total_pages: Option<u32>,
    /// SHA-256 of the text
    pub content_hash: String,
    /// Strategy that produced the text
    pub method: ExtractionMethod,
}

/// Turns uploaded PDF/DOCX/DOC bytes into plain text
pub struct TextExtractor {
    parser: FileParser,
    tools: ExternalTools,
    enable_ocr: bool,
    use_libreoffice: bool,
}

impl TextExtractor {
    /// Create an extractor, probing for external tools
    pub fn new(config: &ExtractionConfig) -> Self {
        Self::with_tools(config, ExternalTools::detect(config.ocr_languages.clone()))
    }

    /// Create an extractor with explicit external tools
    pub fn with_tools(config: &ExtractionConfig, tools: ExternalTools) -> Self {
        Self {
            parser: FileParser::new(Duration::from_secs(config.pdf_timeout_secs)),
            tools,
            enable_ocr: config.enable_ocr,
            use_libreoffice: config.use_libreoffice,
        }
    }

    /// Extract text; empty text after every strategy is a parse error
    pub async fn extract(&self, filename: &str, data: &[u8]) -> Result<ExtractedText> {
        let kind = DocumentKind::from_filename(filename).ok_or_else(|| {
            Error::UnsupportedFileType("Please upload a PDF or DOCX/DOC file.".to_string())
        })?;

        let (parsed, method) = match kind {
            DocumentKind::Pdf => self.extract_pdf(filename, data).await?,
            DocumentKind::Docx => (self.parse_docx_blocking(filename, data).await?, ExtractionMethod::Docx),
            DocumentKind::Doc => {
                if !self.use_libreoffice {
                    return Err(Error::UnsupportedFileType(
                        ".doc conversion is disabled; please upload a PDF or DOCX file.".to_string(),
                    ));
                }
                let docx = self.tools.convert_doc_to_docx(filename, data).await?;
                (self.parse_docx_blocking(filename, &docx).await?, ExtractionMethod::ConvertedDoc)
            }
        };

        let text = parsed.text.trim().to_string();
        if text.is_empty() {
            return Err(Error::file_parse(filename, "No text could be extracted from the document"));
        }

        tracing::info!(
            "Extracted {} chars from {} via {:?}",
            text.len(),
            filename,
            method
        );

        Ok(ExtractedText {
            content_hash: hash_content(&text),
            text,
            total_pages: parsed.total_pages,
            method,
        })
    }

    async fn extract_pdf(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<(parser::ParsedText, ExtractionMethod)> {
        let parser = self.parser;
        let owned_name = filename.to_string();
        let owned = data.to_vec();
        let parsed = tokio::task::spawn_blocking(move || parser.parse_pdf(&owned_name, &owned))
            .await
            .map_err(|e| Error::internal(format!("PDF extraction task failed: {}", e)))??;

        if !parsed.text.trim().is_empty() || !self.enable_ocr || !self.tools.has_ocr() {
            return Ok((parsed, ExtractionMethod::PdfText));
        }

        tracing::info!("{} has no text layer, running OCR", filename);
        let text = self.tools.ocr_pdf(filename, data).await?;
        Ok((
            parser::ParsedText {
                text,
                total_pages: parsed.total_pages,
            },
            ExtractionMethod::Ocr,
        ))
    }

    async fn parse_docx_blocking(&self, filename: &str, data: &[u8]) -> Result<parser::ParsedText> {
        let parser = self.parser;
        let owned_name = filename.to_string();
        let owned = data.to_vec();
        tokio::task::spawn_blocking(move || parser.parse_docx(&owned_name, &owned))
            .await
            .map_err(|e| Error::internal(format!("DOCX extraction task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TextExtractor {
        TextExtractor::with_tools(&ExtractionConfig::default(), ExternalTools::none())
    }

    fn sample_docx(text: &str) -> Vec<u8> {
        use docx_rs::{Docx, Paragraph, Run};
        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
            .build()
            .pack(&mut buf)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let err = extractor().extract("rfp.txt", b"hello").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
        assert!(err.to_string().contains("PDF or DOCX/DOC"));
    }

    #[tokio::test]
    async fn test_extracts_docx() {
        let data = sample_docx("The supplier shall provide 24/7 support.");
        let extracted = extractor().extract("Tender.DOCX", &data).await.unwrap();
        assert_eq!(extracted.text, "The supplier shall provide 24/7 support.");
        assert_eq!(extracted.method, ExtractionMethod::Docx);
        assert_eq!(extracted.content_hash, hash_content(&extracted.text));
    }

    #[tokio::test]
    async fn test_empty_docx_is_parse_error() {
        let data = sample_docx("   ");
        let err = extractor().extract("empty.docx", &data).await.unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
    }

    #[tokio::test]
    async fn test_doc_without_libreoffice_fails() {
        let err = extractor().extract("legacy.doc", b"\xD0\xCF\x11\xE0").await.unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
    }
}
