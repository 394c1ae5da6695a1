//! Plain-text extraction for uploaded training files.
//!
//! PDFs go through `pdf-extract`; everything else is read as UTF-8, with
//! invalid sequences replaced rather than rejected.

use thiserror::Error;

use coachbot_core::models::FileKind;

pub const MIME_PDF: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// The file kind implied by a content type or, failing that, a file name.
pub fn detect_kind(content_type: Option<&str>, file_name: Option<&str>) -> FileKind {
    let by_type = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().eq_ignore_ascii_case(MIME_PDF))
        .unwrap_or(false);
    let by_name = file_name
        .map(|n| n.to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false);
    if by_type || by_name {
        FileKind::Pdf
    } else {
        FileKind::Text
    }
}

/// Extract text from file bytes of the given kind.
pub fn extract_text(bytes: &[u8], kind: FileKind) -> Result<String, ExtractError> {
    match kind {
        FileKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        FileKind::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}
