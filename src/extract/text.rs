//! Document text extraction and persistence.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The document text extractor the pipeline calls into.
///
/// The pipeline only depends on this interface; production wires in
/// [`PdfExtractor`], tests substitute a stub so extraction behavior can be
/// scripted per document.
pub trait TextExtractor: Send + Sync {
    /// Extract the plain text of a single document, or fail with a
    /// document-level error.
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// PDF text extraction via `pdf_extract`.
#[derive(Debug, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let text =
            pdf_extract::extract_text_from_mem(bytes).context("PDF text extraction failed")?;
        Ok(text)
    }
}

/// Output path for a document's text: `<text_dir>/<stem>.txt`.
///
/// The stem is the document's base name without the final extension. The
/// `.txt` suffix is appended rather than substituted so dotted document
/// names (`2301.00001.pdf` → `2301.00001.txt`) survive intact.
pub fn text_output_path(text_dir: &Path, document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));

    let mut name = stem;
    name.push(".txt");
    text_dir.join(name)
}

/// Persist extracted text next to its siblings in the shared output
/// directory. An existing file of the same name is overwritten silently:
/// document names are globally unique in the source catalog, and the flat
/// namespace leans on that.
pub fn save_text(text: &str, document: &Path, text_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(text_dir)
        .with_context(|| format!("Failed to create {}", text_dir.display()))?;

    let path = text_output_path(text_dir, document);
    std::fs::write(&path, text)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
