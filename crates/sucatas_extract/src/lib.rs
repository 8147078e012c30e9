//! Extraction cascade for auction notices.
//!
//! Each extractor takes one document and yields candidates; none of them
//! validates. The [`cascade::Cascade`] resolver combines candidates per
//! field in a fixed priority order and fills the canonical record.

pub mod archive;
pub mod cascade;
pub mod dates;
pub mod docx;
pub mod json;
pub mod money;
pub mod pdf;
pub mod sheet;
pub mod tags;
pub mod text;
pub mod urls;

use sucatas_protocol::{ErrorCode, ValidationError};
use thiserror::Error;

pub use cascade::{Cascade, ExtractionBundle, RegexTable};
pub use json::JsonFields;
pub use pdf::PdfText;
pub use sheet::SheetCell;
pub use tags::TagTaxonomy;

/// Extraction result type.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Per-document extraction failures. Callers turn these into
/// `EXTRACTION_ERROR` entries on the partial record; a single bad document
/// never aborts the candidate.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Spreadsheet extraction failed: {0}")]
    Sheet(String),

    #[error("CSV extraction failed: {0}")]
    Csv(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("ZIP expansion failed: {0}")]
    Zip(String),
}

impl ExtractError {
    /// Structured form carried on the partial record.
    pub fn to_validation_error(&self, document: &str) -> ValidationError {
        ValidationError::new(
            ErrorCode::ExtractionError,
            document.to_string(),
            self.to_string(),
        )
    }
}
