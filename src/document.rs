//! Document loading and cleanup for financial reports.
//!
//! Documents are read as a collection of pages: PDFs page by page, text
//! files as a single page. [`DocumentLoader::load_file`] flattens the pages
//! and strips report noise (page numbers, short disclaimer banners).

use crate::error::{RagError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Lines shorter than this containing "disclaimer" are treated as banners.
const DISCLAIMER_MAX_CHARS: usize = 50;

static PAGE_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\d+$",
        r"(?i)^page\s*\d+(\s*(/|of|-)\s*\d+)?$",
        r"(?i)^\d+\s*(/|of|-)\s*\d+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static page-number pattern"))
    .collect()
});

/// Formats accepted by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Text,
}

impl SourceFormat {
    /// Extensions (with dot) in the allow-list.
    pub const SUPPORTED: [&'static str; 2] = [".pdf", ".txt"];

    /// Determine format from file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(SourceFormat::Pdf),
            "txt" => Ok(SourceFormat::Text),
            _ => Err(RagError::UnsupportedFormat {
                extension: if ext.is_empty() {
                    String::new()
                } else {
                    format!(".{}", ext)
                },
                supported: Self::SUPPORTED.join(", "),
            }),
        }
    }
}

/// Whether `path` has an extension the loader accepts.
pub fn is_supported(path: &Path) -> bool {
    SourceFormat::from_path(path).is_ok()
}

/// A single page in a document.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    /// Extracted text content of the page.
    pub content: String,
}

impl Page {
    /// Create a new page.
    pub fn new(number: usize, content: String) -> Self {
        Self { number, content }
    }
}

/// A document consisting of one or more pages of raw extracted text.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document name (file stem).
    pub name: String,
    /// Original file path.
    pub path: PathBuf,
    /// Pages in the document.
    pub pages: Vec<Page>,
}

impl Document {
    /// Read a supported file into pages without cleaning.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::NotFound(path.to_path_buf()));
        }

        let pages = match SourceFormat::from_path(path)? {
            SourceFormat::Pdf => Self::read_pdf_pages(path)?,
            SourceFormat::Text => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| RagError::load(path, e))?;
                vec![Page::new(1, content)]
            }
        };

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        Ok(Self {
            name,
            path: path.to_path_buf(),
            pages,
        })
    }

    fn read_pdf_pages(path: &Path) -> Result<Vec<Page>> {
        let pdf = lopdf::Document::load(path).map_err(|e| RagError::load(path, e))?;

        let mut pages = Vec::new();
        for (number, _) in pdf.get_pages() {
            match pdf.extract_text(&[number]) {
                Ok(text) if !text.trim().is_empty() => {
                    pages.push(Page::new(number as usize, text));
                }
                Ok(_) => debug!(page = number, "page has no extractable text"),
                Err(e) => warn!(page = number, error = %e, "skipping page without extractable text"),
            }
        }

        Ok(pages)
    }

    /// Get total number of pages that yielded text.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page texts joined with newlines.
    pub fn raw_content(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Loads PDF and plain-text reports into cleaned text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a file and return its cleaned text.
    pub fn load_file(&self, path: &Path) -> Result<String> {
        let document = Document::from_path(path)?;
        debug!(
            name = %document.name,
            pages = document.page_count(),
            "loaded document"
        );
        Ok(clean_text(&document.raw_content()))
    }
}

/// Whether a trimmed line is a page number ("12", "Page 3", "3 of 10").
fn is_page_number(line: &str) -> bool {
    PAGE_NUMBER_PATTERNS.iter().any(|re| re.is_match(line))
}

/// Whether a trimmed line looks like a short disclaimer banner.
fn is_disclaimer_banner(line: &str) -> bool {
    line.chars().count() < DISCLAIMER_MAX_CHARS && line.to_lowercase().contains("disclaimer")
}

/// Strip noise from report text, line by line.
///
/// Trims each line, then drops empty lines, page numbers and short
/// disclaimer banners. Idempotent.
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_page_number(line))
        .filter(|line| !is_disclaimer_banner(line))
        .collect::<Vec<_>>()
        .join("\n")
}
