//! Page text extraction for the files handed to ingestion.
//!
//! PDFs are read page by page with `lopdf`; plain-text files are split on
//! form feeds. Pages whose text cannot be extracted come back blank and are
//! skipped later by ingestion.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document as PdfDocument;
use tracing::{debug, warn};

use crate::{application::services::split_pages, domain::DomainError, domain::PageText};

/// Reads every page of the PDF at `path`, numbered from 1.
pub fn read_pdf_pages(path: impl AsRef<Path>) -> Result<Vec<PageText>, DomainError> {
    let path = path.as_ref();
    let doc = PdfDocument::load(path).map_err(|err| {
        DomainError::validation(format!("failed to load PDF {}: {err}", path.display()))
    })?;

    let pages = doc
        .get_pages()
        .into_keys()
        .map(|page| {
            let text = doc.extract_text(&[page]).unwrap_or_else(|err| {
                warn!(target: "gated_rag::ingest", page, error = %err, "no extractable text");
                String::new()
            });
            PageText { page, text }
        })
        .collect::<Vec<_>>();

    debug!(
        target: "gated_rag::ingest",
        path = %path.display(),
        pages = pages.len(),
        "pdf pages extracted"
    );
    Ok(pages)
}

/// Loads the pages of one document, choosing the reader by file extension.
pub fn load_pages(path: impl AsRef<Path>) -> Result<Vec<PageText>, DomainError> {
    let path = path.as_ref();
    if is_pdf(path) {
        return read_pdf_pages(path);
    }

    let raw = fs::read_to_string(path).map_err(|err| {
        DomainError::validation(format!("failed to read {}: {err}", path.display()))
    })?;
    Ok(split_pages(&raw))
}

/// PDF files directly inside `dir`, sorted by name. Subdirectories are not walked.
pub fn pdfs_in_folder(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, DomainError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|err| {
        DomainError::validation(format!("failed to list {}: {err}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| {
                DomainError::validation(format!("failed to list {}: {err}", dir.display()))
            })?
            .path();
        if path.is_file() && is_pdf(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Default document title: the file name, as the user sees it.
pub fn default_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
