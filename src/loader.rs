//! PDF document loader.
//!
//! Walks a directory recursively, extracts the text of every `*.pdf` file
//! and returns one whole-document [`Document`] per file, sorted by path.
//! Files whose text cannot be read or extracted are skipped with a warning.

use std::path::Path;

use carebot_core::error::{Error, Result};
use carebot_core::models::Document;
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

/// Files picked up by the loader, relative to the data directory.
pub const PDF_GLOB: &str = "**/*.pdf";

pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(Error::NoDocumentsFound(dir.display().to_string()));
    }

    let matcher = pdf_matcher()?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if !matcher.is_match(relative) {
            continue;
        }

        match extract_pdf(path) {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(path = %path.display(), "no extractable text, skipping");
            }
            Ok(text) => {
                documents.push(Document::whole(path.display().to_string(), text));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "PDF extraction failed, skipping");
            }
        }
    }

    if documents.is_empty() {
        return Err(Error::NoDocumentsFound(dir.display().to_string()));
    }

    tracing::info!(dir = %dir.display(), count = documents.len(), "documents loaded");
    Ok(documents)
}

fn pdf_matcher() -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(PDF_GLOB)
        .case_insensitive(true)
        .literal_separator(false)
        .build()
        .map_err(|e| Error::invalid_config("PDF_GLOB", e.to_string()))?;
    Ok(glob.compile_matcher())
}

fn extract_pdf(path: &Path) -> std::result::Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
}
