//! Spreadsheet extractors (XLSX, XLS, CSV).
//!
//! Only the first sheet is read, capped at 50 data rows. Cells are kept as
//! `(header, value)` candidates for columns whose header looks relevant to
//! the notice contract; the cascade decides how to interpret them.

use crate::text::{collapse_whitespace, normalize_upper, repair_mojibake};
use crate::{ExtractError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;

/// Row cap applied after the header row.
const MAX_ROWS: usize = 50;

static INTERESTING_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)edital|data|leilao|abertura|descricao|objeto|valor|url")
        .expect("header regex")
});

/// One candidate cell from a relevant column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetCell {
    /// Accent-stripped uppercase header of the column.
    pub header: String,
    pub value: String,
}

impl SheetCell {
    pub fn header_contains(&self, needle: &str) -> bool {
        self.header.contains(&normalize_upper(needle))
    }
}

/// Extract candidate cells from an XLSX/XLS workbook.
pub fn extract_sheet(bytes: &[u8]) -> Result<Vec<SheetCell>> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|err| ExtractError::Sheet(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::Sheet("workbook has no sheets".to_string()))?
        .map_err(|err| ExtractError::Sheet(err.to_string()))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<Option<String>> = header_row.iter().map(relevant_header).collect();

    let mut cells = Vec::new();
    for row in rows.take(MAX_ROWS) {
        for (idx, cell) in row.iter().enumerate() {
            let Some(Some(header)) = headers.get(idx) else {
                continue;
            };
            if let Some(value) = cell_to_string(cell) {
                cells.push(SheetCell {
                    header: header.clone(),
                    value,
                });
            }
        }
    }
    Ok(cells)
}

/// Extract candidate cells from a CSV body. The delimiter is sniffed from
/// the header line; Brazilian exports favor `;`.
pub fn extract_csv(bytes: &[u8]) -> Result<Vec<SheetCell>> {
    let delimiter = sniff_delimiter(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<Option<String>> = reader
        .headers()
        .map_err(|err| ExtractError::Csv(err.to_string()))?
        .iter()
        .map(|h| relevant_header_str(h))
        .collect();

    let mut cells = Vec::new();
    for result in reader.records().take(MAX_ROWS) {
        let record = result.map_err(|err| ExtractError::Csv(err.to_string()))?;
        for (idx, field) in record.iter().enumerate() {
            let Some(Some(header)) = headers.get(idx) else {
                continue;
            };
            let value = collapse_whitespace(&repair_mojibake(field));
            if !value.is_empty() {
                cells.push(SheetCell {
                    header: header.clone(),
                    value,
                });
            }
        }
    }
    Ok(cells)
}

fn relevant_header(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => relevant_header_str(s),
        _ => None,
    }
}

fn relevant_header_str(raw: &str) -> Option<String> {
    let cleaned = normalize_upper(&collapse_whitespace(&repair_mojibake(raw)));
    if cleaned.is_empty() || !INTERESTING_HEADER.is_match(&cleaned) {
        None
    } else {
        Some(cleaned)
    }
}

fn cell_to_string(cell: &Data) -> Option<String> {
    let value = match cell {
        Data::String(s) => collapse_whitespace(&repair_mojibake(s)),
        Data::Float(f) => {
            if (f.fract()).abs() < f64::EPSILON {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| naive.format("%d-%m-%Y").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let head = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = head.iter().filter(|b| **b == b';').count();
    let commas = head.iter().filter(|b| **b == b',').count();
    if semicolons >= commas && semicolons > 0 {
        b';'
    } else {
        b','
    }
}
