//! Extract the text of a PDF by OCRing each page.

use std::sync::Arc;

use futures::{StreamExt as _, TryStreamExt as _, stream};

use crate::{
    error::ExtractionError,
    pages::{PopplerRasterizer, RASTERIZE_DPI, Rasterizer},
    prelude::*,
    recognize::{Recognizer, TesseractRecognizer},
};

/// Separator placed between the text of consecutive pages.
const PAGE_SEPARATOR: &str = "\n\n";

/// Splits a document into page images, and OCRs each page.
pub struct Extractor {
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    job_count: usize,
}

impl Extractor {
    /// Create a new `Extractor` from the given engines.
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            job_count: 1,
        }
    }

    /// Create an `Extractor` using Poppler and Tesseract.
    pub fn with_default_tools() -> Self {
        Self::new(
            Arc::new(PopplerRasterizer::default()),
            Arc::new(TesseractRecognizer::default()),
        )
    }

    /// Recognize up to `job_count` pages at once. Output is still in page
    /// order. A count of 0 is treated as 1.
    pub fn with_job_count(mut self, job_count: usize) -> Self {
        self.job_count = job_count.max(1);
        self
    }

    /// Extract the text of the PDF at `path`.
    ///
    /// Page texts are joined with a blank line and the result is trimmed. Page
    /// images are deleted before we return, whether or not we succeed.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let pages = self
            .rasterizer
            .rasterize(path, RASTERIZE_DPI)
            .await
            .map_err(|err| ExtractionError::Rasterization {
                path: path.to_owned(),
                source: err.into(),
            })?;
        if pages.is_empty() {
            debug!("Document has no pages");
            return Ok(String::new());
        }
        debug!(page_count = pages.len(), "Recognizing pages");

        let texts = stream::iter(pages.iter())
            .map(|page| async move {
                self.recognizer.recognize(page).await.map_err(|err| {
                    ExtractionError::Recognition {
                        page_idx: page.index(),
                        source: err.into(),
                    }
                })
            })
            // Recognize pages concurrently, up to our job count, keeping them
            // in order.
            .buffered(self.job_count)
            // Stop at the first failure. This drops any pages still running,
            // which kills their OCR processes.
            .try_collect::<Vec<_>>()
            .await?;

        // Delete our page images now that we're done with them.
        drop(pages);
        Ok(join_pages(&texts))
    }
}

/// Join the text of each page, and trim the result.
pub fn join_pages(texts: &[String]) -> String {
    texts.join(PAGE_SEPARATOR).trim().to_owned()
}
