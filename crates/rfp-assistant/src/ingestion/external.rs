//! External command-line converters: LibreOffice for legacy .doc, and
//! pdftoppm + tesseract OCR for scanned PDFs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Wrapper around the optional system tools used during extraction
#[derive(Debug, Clone)]
pub struct ExternalTools {
    libreoffice: Option<PathBuf>,
    pdftoppm: Option<PathBuf>,
    tesseract: Option<PathBuf>,
    ocr_languages: String,
}

impl ExternalTools {
    /// Probe `PATH` for the converters
    pub fn detect(ocr_languages: impl Into<String>) -> Self {
        let libreoffice = which::which("libreoffice")
            .or_else(|_| which::which("soffice"))
            .ok();
        let pdftoppm = which::which("pdftoppm").ok();
        let tesseract = which::which("tesseract").ok();

        if libreoffice.is_none() {
            tracing::info!("LibreOffice not found in PATH - .doc uploads will be rejected");
        }
        if pdftoppm.is_none() || tesseract.is_none() {
            tracing::info!("pdftoppm/tesseract not found in PATH - OCR fallback disabled");
        }

        Self {
            libreoffice,
            pdftoppm,
            tesseract,
            ocr_languages: ocr_languages.into(),
        }
    }

    /// Tools with nothing installed
    pub fn none() -> Self {
        Self {
            libreoffice: None,
            pdftoppm: None,
            tesseract: None,
            ocr_languages: "eng".to_string(),
        }
    }

    /// Whether .doc conversion is possible
    pub fn has_libreoffice(&self) -> bool {
        self.libreoffice.is_some()
    }

    /// Whether OCR is possible
    pub fn has_ocr(&self) -> bool {
        self.pdftoppm.is_some() && self.tesseract.is_some()
    }

    /// Convert a legacy .doc to .docx bytes with headless LibreOffice
    pub async fn convert_doc_to_docx(&self, filename: &str, data: &[u8]) -> Result<Vec<u8>> {
        let soffice = self.libreoffice.as_ref().ok_or_else(|| {
            Error::file_parse(
                filename,
                "LibreOffice is required to read .doc files; save the file as .docx or PDF",
            )
        })?;

        let temp_dir = tempfile::tempdir()?;
        let input_path = temp_dir.path().join("input.doc");
        tokio::fs::write(&input_path, data).await?;

        let output = Command::new(soffice)
            .arg("--headless")
            .arg("--convert-to")
            .arg("docx")
            .arg("--outdir")
            .arg(temp_dir.path())
            .arg(&input_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::file_parse(
                filename,
                format!(
                    "LibreOffice conversion failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let converted = temp_dir.path().join("input.docx");
        tokio::fs::read(&converted).await.map_err(|e| {
            Error::file_parse(filename, format!("LibreOffice produced no output: {}", e))
        })
    }

    /// OCR every page of a PDF; pages are joined with blank lines
    pub async fn ocr_pdf(&self, filename: &str, data: &[u8]) -> Result<String> {
        let (Some(pdftoppm), Some(tesseract)) = (&self.pdftoppm, &self.tesseract) else {
            return Err(Error::file_parse(
                filename,
                "OCR requires pdftoppm and tesseract (apt install poppler-utils tesseract-ocr)",
            ));
        };

        let temp_dir = tempfile::tempdir()?;
        let pdf_path = temp_dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, data).await?;

        let output = Command::new(pdftoppm)
            .arg("-png")
            .args(["-r", "150"])
            .arg(&pdf_path)
            .arg(temp_dir.path().join("page"))
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::file_parse(
                filename,
                format!("pdftoppm failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            ));
        }

        let images = page_images(temp_dir.path())?;
        if images.is_empty() {
            return Err(Error::file_parse(filename, "pdftoppm produced no page images"));
        }

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let ocr = Command::new(tesseract)
                .arg(image)
                .arg("stdout")
                .args(["-l", &self.ocr_languages])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await?;

            if !ocr.status.success() {
                tracing::warn!("tesseract failed on page {} of {}", i + 1, filename);
                continue;
            }
            let text = String::from_utf8_lossy(&ocr.stdout).trim().to_string();
            if !text.is_empty() {
                pages.push(text);
            }
        }

        tracing::info!("OCR extracted text from {}/{} pages of {}", pages.len(), images.len(), filename);
        Ok(pages.join("\n\n"))
    }
}

/// PNG files in `dir`, sorted so page order is preserved
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
        .collect();
    // pdftoppm zero-pads page numbers to a common width, so lexical order works
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tools_are_reported() {
        let tools = ExternalTools::none();
        assert!(!tools.has_libreoffice());
        assert!(!tools.has_ocr());

        let err = tools.convert_doc_to_docx("old.doc", b"x").await.unwrap_err();
        assert!(err.to_string().contains("LibreOffice"));

        let err = tools.ocr_pdf("scan.pdf", b"x").await.unwrap_err();
        assert!(err.to_string().contains("tesseract"));
    }

    #[test]
    fn test_page_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-02.png", "page-01.png", "notes.txt", "page-10.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let images = page_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-10.png"]);
    }
}
