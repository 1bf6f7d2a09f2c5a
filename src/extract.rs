//! Per-page text extraction from PDF bytes.
//!
//! Works entirely in memory: the caller's bytes are parsed directly, so no
//! temporary file or handle outlives the call on any exit path. Image-only
//! pages yield an empty [`PageDocument`] rather than an error.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::PageDocument;

/// MIME type accepted by the extractor.
pub const MIME_PDF: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extract one [`PageDocument`] per page, in page order.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if `bytes` is empty, lacks a PDF header,
/// or cannot be parsed.
pub fn extract_text(bytes: &[u8], source_name: &str) -> Result<Vec<PageDocument>> {
    if bytes.is_empty() {
        return Err(Error::extraction(format!("{}: empty document", source_name)));
    }
    if !looks_like_pdf(bytes) {
        return Err(Error::extraction(format!(
            "{}: not a PDF (missing %PDF- header)",
            source_name
        )));
    }

    let pages = extract_pages(bytes)
        .map_err(|e| Error::extraction(format!("{}: {}", source_name, e)))?;

    let docs: Vec<PageDocument> = pages
        .into_iter()
        .enumerate()
        .map(|(page_index, text)| PageDocument {
            text,
            page_index,
            source_name: source_name.to_string(),
        })
        .collect();

    let empty = docs.iter().filter(|d| d.text.trim().is_empty()).count();
    if empty > 0 {
        debug!(source = source_name, empty, "pages without extractable text");
    }
    info!(source = source_name, pages = docs.len(), "extracted pdf text");

    Ok(docs)
}

/// The header may be preceded by a few bytes of garbage in the wild.
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

fn extract_pages(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    // pdf-extract panics on some malformed content streams.
    match panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("PDF parser aborted on malformed content".to_string()),
    }
}
