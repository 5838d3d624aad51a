//! Tesseract OCR engine.

use tokio::process::Command;

use crate::{command::run_tool, pages::PageImage, prelude::*};

/// Interface to an OCR engine.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    /// OCR a single page, returning its text. Pages with no text return an
    /// empty string.
    async fn recognize(&self, page: &PageImage) -> Result<String>;
}

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct TesseractRecognizer {}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    #[instrument(level = "debug", skip_all, fields(page = %page.index()))]
    async fn recognize(&self, page: &PageImage) -> Result<String> {
        // Have tesseract write the text to standard output instead of a file.
        let mut cmd = Command::new("tesseract");
        cmd.arg(page.path()).arg("stdout");
        let output = run_tool("tesseract", &mut cmd).await?;
        String::from_utf8(output.stdout).context("tesseract output was not valid UTF-8")
    }
}
