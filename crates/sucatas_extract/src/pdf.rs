//! PDF text extraction.
//!
//! Pages are extracted one at a time and appended up to a hard cap, so a
//! 300-page attachment never materializes as one giant allocation before
//! we decide we have enough text.

use crate::{ExtractError, Result};
use lopdf::Document;
use tracing::debug;

/// Text cap per document; the cascade only ever looks at the head of
/// very large notices anyway.
const MAX_TEXT_BYTES: usize = 2 * 1024 * 1024;

/// A page-1 text shorter than this means "scanned image, no text layer".
const SCANNED_TEXT_THRESHOLD: usize = 50;

/// Extracted text plus per-page positions.
#[derive(Debug, Clone, Default)]
pub struct PdfText {
    pub text: String,
    /// `(page_number, byte_offset_into_text)` per extracted page.
    pub page_offsets: Vec<(u32, usize)>,
    pub page_count: u32,
    /// No extractable text on page 1 - likely a scan without OCR.
    pub scanned_image: bool,
}

/// Extract the text layer of a PDF.
pub fn extract_pdf(bytes: &[u8]) -> Result<PdfText> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractError::Pdf("missing %PDF header".to_string()));
    }
    let document =
        Document::load_mem(bytes).map_err(|err| ExtractError::Pdf(err.to_string()))?;

    let pages = document.get_pages();
    let page_count = pages.len() as u32;
    let mut out = PdfText {
        page_count,
        ..Default::default()
    };

    for (&page_number, _) in pages.iter() {
        if out.text.len() >= MAX_TEXT_BYTES {
            debug!(page_number, "text cap reached, stopping extraction");
            break;
        }
        out.page_offsets.push((page_number, out.text.len()));
        match document.extract_text(&[page_number]) {
            Ok(page_text) => {
                out.text.push_str(&page_text);
                out.text.push('\n');
            }
            Err(err) => {
                // One broken page does not fail the document
                debug!(page_number, %err, "page text extraction failed");
            }
        }
    }

    let first_page_len = match out.page_offsets.get(1) {
        Some((_, next_offset)) => out.text[..*next_offset].trim().len(),
        None => out.text.trim().len(),
    };
    out.scanned_image = first_page_len < SCANNED_TEXT_THRESHOLD;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    /// Minimal single-page PDF with a text object, built by hand. lopdf can
    /// parse this shape without an xref table being pretty.
    fn tiny_pdf(text: &str) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(lopdf::dictionary! {
            "Font" => lopdf::dictionary! { "F1" => font_id },
        });
        let content = lopdf::content::Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new(
                    "Tf",
                    vec!["F1".into(), 12.into()],
                ),
                lopdf::content::Operation::new("Td", vec![72.into(), 712.into()]),
                lopdf::content::Operation::new(
                    "Tj",
                    vec![lopdf::Object::string_literal(text)],
                ),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(lopdf::Stream::new(
            lopdf::dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages = lopdf::dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, lopdf::Object::Dictionary(pages));
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn extracts_text_and_positions() {
        let bytes = tiny_pdf(
            "EDITAL DE LEILAO No 12/2026 - veiculos e sucatas do municipio, conforme anexo",
        );
        let parsed = extract_pdf(&bytes).unwrap();
        assert_eq!(parsed.page_count, 1);
        assert!(parsed.text.contains("EDITAL DE LEILAO"));
        assert_eq!(parsed.page_offsets.len(), 1);
        assert_eq!(parsed.page_offsets[0].0, 1);
        assert!(!parsed.scanned_image);
    }

    #[test]
    fn short_first_page_flags_scanned_image() {
        let bytes = tiny_pdf("pg");
        let parsed = extract_pdf(&bytes).unwrap();
        assert!(parsed.scanned_image);
    }

    #[test]
    fn garbage_is_a_structured_failure() {
        assert!(extract_pdf(b"not a pdf at all").is_err());
        assert!(extract_pdf(b"%PDF-1.4 truncated").is_err());
    }
}
