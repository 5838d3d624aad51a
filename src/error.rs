//! Errors reported by [`crate::extract::Extractor`].

use thiserror::Error;

use crate::prelude::*;

/// The underlying cause of an [`ExtractionError`].
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Ways that extracting text from a PDF can fail.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// We could not turn the document into page images.
    #[error("could not rasterize {:?}", .path.display())]
    Rasterization {
        path: PathBuf,
        #[source]
        source: BoxedError,
    },

    /// OCR failed on a page. `page_idx` is 0-based.
    #[error("could not recognize text on page {}", .page_idx + 1)]
    Recognition {
        page_idx: usize,
        #[source]
        source: BoxedError,
    },
}

/// Render an error and all of its causes on a single line.
///
/// Tools like `pdftocairo` put newlines in their error output, which we fold
/// into spaces.
pub fn error_line(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts
        .join(": ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
