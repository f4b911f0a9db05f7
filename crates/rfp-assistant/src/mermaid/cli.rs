//! Renderer backed by the `mmdc` command line tool

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::MermaidConfig;
use crate::error::{Error, Result};

use super::{strip_mermaid_fences, DiagramFormat, MermaidRenderer};

const PUPPETEER_CONFIG: &str = r#"{"args": ["--no-sandbox", "--disable-setuid-sandbox"]}"#;

/// Runs `mmdc -i diagram.mmd -o diagram.<png|svg>` in a temp directory
#[derive(Debug, Clone)]
pub struct CliRenderer {
    mmdc: PathBuf,
    no_sandbox: bool,
    timeout: Duration,
}

impl CliRenderer {
    pub fn new(mmdc: impl Into<PathBuf>, no_sandbox: bool, timeout: Duration) -> Self {
        Self {
            mmdc: mmdc.into(),
            no_sandbox,
            timeout,
        }
    }

    /// Locate `mmdc`; `None` when it is not installed.
    /// Chromium's sandbox is disabled when configured or when running as root.
    pub fn from_config(config: &MermaidConfig) -> Option<Self> {
        let mmdc = find_mmdc(config.cli_path.as_deref())?;
        Some(Self::new(
            mmdc,
            config.no_sandbox || running_as_root(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    async fn run(&self, args: &[&OsStr]) -> Result<std::process::Output> {
        let child = Command::new(&self.mmdc)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::Render(format!("mmdc timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| Error::Render(format!("failed to run mmdc: {}", e)))
    }
}

#[async_trait]
impl MermaidRenderer for CliRenderer {
    async fn render_png(&self, code: &str) -> Result<Vec<u8>> {
        self.render(code, DiagramFormat::Png).await
    }

    /// mmdc picks the output format from the file extension
    async fn render(&self, code: &str, format: DiagramFormat) -> Result<Vec<u8>> {
        let code = strip_mermaid_fences(code)?;

        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("diagram.mmd");
        let output_path = temp_dir
            .path()
            .join(format!("diagram.{}", format.extension()));
        tokio::fs::write(&input, code.as_bytes()).await?;

        let base: [&OsStr; 4] = [
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-o"),
            output_path.as_os_str(),
        ];

        let output = if self.no_sandbox {
            let config_path = temp_dir.path().join("puppeteer-config.json");
            tokio::fs::write(&config_path, PUPPETEER_CONFIG).await?;

            let mut args = base.to_vec();
            args.extend([OsStr::new("--puppeteerConfigFile"), config_path.as_os_str()]);
            let output = self.run(&args).await?;

            if !output.status.success() && is_unknown_option(&output.stderr) {
                tracing::info!("mmdc did not recognize --puppeteerConfigFile; retrying with -p");
                let mut args = base.to_vec();
                args.extend([OsStr::new("-p"), config_path.as_os_str()]);
                self.run(&args).await?
            } else {
                output
            }
        } else {
            self.run(&base).await?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(Error::Render(format!("mmdc rendering failed: {}", detail.trim())));
        }

        let image = tokio::fs::read(&output_path)
            .await
            .map_err(|_| Error::Render("mmdc did not produce an output file".to_string()))?;
        tracing::debug!("Rendered Mermaid diagram to {} ({} bytes)", format, image.len());
        Ok(image)
    }

    fn name(&self) -> &str {
        "mmdc"
    }
}

fn is_unknown_option(stderr: &[u8]) -> bool {
    let stderr = String::from_utf8_lossy(stderr).to_lowercase();
    stderr.contains("unknown option") || stderr.contains("unrecognized option")
}

/// Configured path (as a file or a name on `PATH`), then `mmdc` on `PATH`
fn find_mmdc(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(configured) = configured.filter(|p| !p.trim().is_empty()) {
        let path = Path::new(configured);
        if path.exists() {
            return Some(path.to_path_buf());
        }
        if let Ok(resolved) = which::which(configured) {
            return Some(resolved);
        }
        tracing::warn!("Configured Mermaid CLI path not found: {}", configured);
    }
    which::which("mmdc").ok()
}

/// Effective uid 0, read from `/proc/self/status`
fn running_as_root() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| effective_uid(&status))
        .map_or(false, |uid| uid == 0)
}

fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_uid() {
        let status = "Name:\tmmdc\nUid:\t1000\t0\t1000\t1000\nGid:\t1000\n";
        assert_eq!(effective_uid(status), Some(0));
        assert_eq!(effective_uid("Name:\tx\n"), None);
    }

    #[test]
    fn test_unknown_option_detection() {
        assert!(is_unknown_option(b"error: Unknown option '--puppeteerConfigFile'"));
        assert!(!is_unknown_option(b"Parse error on line 2"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_render_error() {
        let renderer = CliRenderer::new("/nonexistent/mmdc", false, Duration::from_secs(5));
        let err = renderer.render_png("graph TD; A-->B").await.unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[tokio::test]
    async fn test_svg_render_runs_mmdc() {
        let renderer = CliRenderer::new("/nonexistent/mmdc", false, Duration::from_secs(5));
        let err = renderer
            .render("graph TD; A-->B", DiagramFormat::Svg)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to run mmdc"));
    }

    #[tokio::test]
    async fn test_empty_diagram_rejected_before_spawn() {
        let renderer = CliRenderer::new("/nonexistent/mmdc", false, Duration::from_secs(5));
        assert!(matches!(renderer.render_png("```mermaid\n```").await, Err(Error::Render(_))));
    }
}
