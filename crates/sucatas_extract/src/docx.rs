//! DOCX text extraction: paragraphs and table cells in document order.

use crate::{ExtractError, Result};
use quick_xml::events::Event;
use std::io::{Cursor, Read};

/// Extract visible text from a DOCX body. Table cells fall out naturally:
/// their content is ordinary `w:p` paragraphs inside `w:tc` elements, so a
/// single pass over `word/document.xml` preserves document order.
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ExtractError::Docx(err.to_string()))?;
    let mut document_xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| ExtractError::Docx(format!("word/document.xml missing: {}", err)))?
        .read_to_end(&mut document_xml)
        .map_err(|err| ExtractError::Docx(err.to_string()))?;

    let mut reader = quick_xml::Reader::from_reader(document_xml.as_slice());
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"w:tab" => out.push('\t'),
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|err| ExtractError::Docx(err.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(ExtractError::Docx(err.to_string())),
        }
        buf.clear();
    }

    Ok(out.trim().to_string())
}
