//! Turn a PDF into one PNG image per page.
//!
//! The images live in a temporary directory owned by a [`PageSet`]. Dropping
//! the [`PageSet`] deletes them, so they are cleaned up no matter how the
//! extraction ends.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read as _},
    sync::LazyLock,
};

use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;

use crate::{
    command::run_tool,
    prelude::*,
};

/// The resolution at which we rasterize pages.
pub const RASTERIZE_DPI: u32 = 300;

/// The header which marks a file as a PDF.
const PDF_HEADER: &[u8] = b"%PDF-";

/// How far into a file Poppler looks for [`PDF_HEADER`].
const PDF_HEADER_SEARCH_LEN: u64 = 1024;

/// File names produced by `pdftocairo`, which appends `-N` to the output root.
static PAGE_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)$").expect("failed to compile regex"));

/// Something which can turn a document into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync + 'static {
    /// Rasterize every page of the document at `path`, at `dpi`.
    async fn rasterize(&self, path: &Path, dpi: u32) -> Result<PageSet>;
}

/// A single rasterized page, backed by a temporary file.
///
/// The file is deleted when this is dropped.
#[derive(Debug)]
pub struct PageImage {
    /// 0-based page index.
    index: usize,
    /// Path to our image file.
    path: PathBuf,
}

impl PageImage {
    /// The 0-based index of this page within the document.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The path to the image file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PageImage {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = ?self.path.display(),
                "failed to delete page image: {}",
                err
            ),
        }
    }
}

/// All the rasterized pages of a document, in page order.
#[derive(Debug)]
pub struct PageSet {
    /// Our pages. These must be dropped before `tmpdir`.
    pages: Vec<PageImage>,
    /// The directory holding our pages.
    ///
    /// This is released by [`Drop`].
    tmpdir: Option<TempDir>,
}

impl PageSet {
    /// Create a new, empty temporary directory for page images.
    pub fn new_tempdir() -> Result<TempDir> {
        TempDir::with_prefix("pdf-ocr-pages")
            .context("failed to create temporary directory for pages")
    }

    /// Take ownership of a temporary directory full of page images, and order
    /// them by the page number at the end of each file name.
    pub fn from_tempdir(tmpdir: TempDir) -> Result<Self> {
        let tmpdir_path = tmpdir.path();
        let mut dir_paths = tmpdir_path
            .read_dir()
            .with_context(|| {
                format!(
                    "failed to read temporary directory {:?}",
                    tmpdir_path.display()
                )
            })?
            .map(|entry| {
                let entry = entry.with_context(|| {
                    format!(
                        "failed to read entry in temporary directory {:?}",
                        tmpdir_path.display()
                    )
                })?;
                Ok(entry.path())
            })
            .collect::<Result<Vec<_>>>()?;
        dir_paths.sort_by_cached_key(|path| (page_number(path), path.clone()));

        let pages = dir_paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| PageImage { index, path })
            .collect();
        Ok(Self {
            pages,
            tmpdir: Some(tmpdir),
        })
    }

    /// How many pages do we have?
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Do we have no pages at all?
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Iterate over our pages, in order.
    pub fn iter(&self) -> std::slice::Iter<'_, PageImage> {
        self.pages.iter()
    }
}

impl Drop for PageSet {
    fn drop(&mut self) {
        // Delete our page images, then our temporary directory.
        self.pages.clear();
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                warn!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

/// Rasterizer using Poppler's `pdfinfo` and `pdftocairo` CLI tools.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct PopplerRasterizer {}

#[async_trait]
impl Rasterizer for PopplerRasterizer {
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = dpi))]
    async fn rasterize(&self, path: &Path, dpi: u32) -> Result<PageSet> {
        // Refuse anything that isn't a PDF before we start external tools.
        check_pdf_header(path)?;

        // Count the number of pages in the PDF.
        let total_pages = get_pdf_page_count(path).await?;

        // Run pdftocairo to convert the PDF to PNG files. It will add `-N` to
        // our output root for each page.
        let tmpdir = PageSet::new_tempdir()?;
        let out_root = tmpdir.path().join("page");
        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(path)
            .arg(&out_root);
        run_tool("pdftocairo", &mut cmd).await?;

        let pages = PageSet::from_tempdir(tmpdir)?;
        if pages.len() != total_pages {
            return Err(anyhow!(
                "pdftocairo produced {} images for {} pages in {:?}",
                pages.len(),
                total_pages,
                path.display()
            ));
        }
        debug!(page_count = total_pages, "Rasterized PDF");
        Ok(pages)
    }
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let mut cmd = Command::new("pdfinfo");
    cmd.arg(path);
    let output = run_tool("pdfinfo", &mut cmd).await?;
    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    parse_pdfinfo_page_count(&output).with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Find the `Pages:` property in the output of `pdfinfo`.
fn parse_pdfinfo_page_count(output: &str) -> Result<usize> {
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key, value);
    }
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str
        .parse::<usize>()
        .with_context(|| format!("invalid page count {:?}", page_count_str))
}

/// Get the page number from a file name like `page-12.png`.
fn page_number(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    PAGE_NUMBER_REGEX
        .captures(stem)
        .and_then(|caps| caps[1].parse().ok())
}

/// Check that `path` looks like a PDF the way Poppler does, by looking for a
/// `%PDF-` header anywhere in the first 1024 bytes. This allows for byte order
/// marks, blank lines and mail headers in front of the real document. Whether
/// the rest of the file makes sense is up to `pdfinfo`.
pub fn check_pdf_header(path: &Path) -> Result<()> {
    let mut head = Vec::new();
    fs::File::open(path)
        .and_then(|file| file.take(PDF_HEADER_SEARCH_LEN).read_to_end(&mut head))
        .with_context(|| format!("failed to read {:?}", path.display()))?;
    if head
        .windows(PDF_HEADER.len())
        .any(|window| window == PDF_HEADER)
    {
        return Ok(());
    }

    // Name what we found instead, if we can tell.
    let file_type = infer::get(&head).map_or("unknown", |kind| kind.mime_type());
    Err(anyhow!(
        "unsupported file type {} for {:?} (expected a PDF)",
        file_type,
        path.display()
    ))
}
