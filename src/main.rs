use std::{process::ExitCode, str::FromStr};

use clap::{Parser, error::ErrorKind};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{
    error::{ExtractionError, error_line},
    extract::Extractor,
    prelude::*,
};

mod command;
mod error;
mod extract;
mod pages;
mod prelude;
mod recognize;

/// Printed to standard output when we're called with the wrong arguments.
const USAGE: &str = "Usage: pdf-ocr <pdf_path>";

/// Prefix for extraction failures on standard error.
const ERROR_TAG: &str = "OCR_ERROR: ";

/// Rasterize a PDF and print the OCRed text of every page.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
External Tools:
  - pdfinfo and pdftocairo from poppler-utils.
  - tesseract.

  These must be on your PATH.

Environment Variables:
  - RUST_LOG (optional): Log filter, written to standard error.
"#
)]
struct Opts {
    /// The PDF file to OCR.
    pdf_path: PathBuf,

    /// Max number of pages to OCR at a time.
    #[clap(short = 'j', long = "jobs", default_value = "1")]
    job_count: usize,
}

/// Our entry point. Sets up logging and reports errors the way callers of this
/// tool expect.
#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing.
    let directive =
        Directive::from_str("warn").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Parse command-line arguments. Anything but `--help` and `--version` that
    // clap doesn't like is a usage error.
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(err)
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            err.exit()
        }
        Err(err) => {
            debug!("Invalid arguments: {}", err);
            println!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };
    debug!("Parsed options: {:?}", opts);

    match real_main(&opts).await {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}{}", ERROR_TAG, error_line(&err));
            ExitCode::FAILURE
        }
    }
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(opts: &Opts) -> Result<String, ExtractionError> {
    let extractor = Extractor::with_default_tools().with_job_count(opts.job_count);
    extractor.extract_text(&opts.pdf_path).await
}
