//! Date parsing for the Brazilian notice formats the pipeline meets.
//!
//! Canonical storage form for dates is the string `DD-MM-YYYY`; datetimes
//! keep their offset and are stored RFC-3339.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{2})[/-](\d{2})[/-](\d{4})\b").expect("numeric date regex"));

static LONG_FORM_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+de\s+(janeiro|fevereiro|março|marco|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)\s+de\s+(\d{4})\b")
        .expect("long form date regex")
});

/// Parse an ISO-8601 datetime, tolerating a missing offset (PNCP emits
/// naive local timestamps) and a trailing `Z`.
pub fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(&trimmed.replace('Z', "+00:00")) {
        return Some(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    // Date-only payloads still carry a usable day
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

/// Canonical `DD-MM-YYYY` form.
pub fn format_dd_mm_yyyy(dt: &NaiveDateTime) -> String {
    dt.format("%d-%m-%Y").to_string()
}

/// ISO datetime string (as received from a source) to canonical date form.
pub fn iso_to_dd_mm_yyyy(value: &str) -> Option<String> {
    parse_iso_datetime(value).map(|dt| format_dd_mm_yyyy(&dt))
}

/// True for strings already in the canonical `DD-MM-YYYY` shape with a
/// plausible calendar day.
pub fn is_canonical_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%d-%m-%Y").is_ok()
}

/// First `DD/MM/YYYY` or `DD-MM-YYYY` date in `text` whose year is at
/// least `min_year`.
pub fn find_numeric_date(text: &str, min_year: i32) -> Option<String> {
    for caps in NUMERIC_DATE.captures_iter(text) {
        let (day, month, year) = (
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps[3].parse::<i32>().ok()?,
        );
        if year < min_year {
            continue;
        }
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date.format("%d-%m-%Y").to_string());
        }
    }
    None
}

/// Numeric date appearing within `window` chars after one of the context
/// keywords ("data de abertura", "sessão", "realização").
pub fn find_contextual_date(text: &str, keywords: &Regex, window: usize) -> Option<String> {
    for keyword_match in keywords.find_iter(text) {
        let start = keyword_match.end();
        let end = (start + window).min(text.len());
        // Snap to char boundaries; PDF text is full of multibyte chars.
        let start = ceil_char_boundary(text, start);
        let end = ceil_char_boundary(text, end);
        if start >= end {
            continue;
        }
        if let Some(date) = find_numeric_date(&text[start..end], 1900) {
            return Some(date);
        }
    }
    None
}

/// Long-form Portuguese date: `15 de fevereiro de 2026`.
pub fn find_long_form_date(text: &str) -> Option<String> {
    let caps = LONG_FORM_DATE.captures(text)?;
    let day = caps[1].parse::<u32>().ok()?;
    let month = month_number(&caps[2].to_lowercase())?;
    let year = caps[3].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%d-%m-%Y").to_string())
}

/// The current year, used as the floor for "any date in the PDF" fallback.
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "janeiro" => 1,
        "fevereiro" => 2,
        "março" | "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(month)
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
