//! Text normalization helpers shared by extractors and the validator.

use unicode_normalization::UnicodeNormalization;

/// NFKD-decompose and drop combining marks, then trim. `São Paulo` and
/// `Sao Paulo` compare equal after this.
pub fn normalize_text(value: &str) -> String {
    value
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Accent-stripped uppercase form used for keyword matching.
pub fn normalize_upper(value: &str) -> String {
    normalize_text(value).to_uppercase()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cap a string at `max` characters, appending an ellipsis when truncated.
pub fn truncate_with_ellipsis(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Undo the latin-1→utf-8 double decode PNCP payloads sometimes carry:
/// when re-encoding the string as windows-1252 yields bytes that decode
/// cleanly as UTF-8 with fewer mojibake markers, use that reading.
pub fn repair_mojibake(value: &str) -> String {
    if !value.contains('Ã') && !value.contains('Â') {
        return value.to_string();
    }
    let (bytes, _, had_unmappable) = encoding_rs::WINDOWS_1252.encode(value);
    if had_unmappable {
        return value.to_string();
    }
    match std::str::from_utf8(&bytes) {
        Ok(repaired) if mojibake_score(repaired) < mojibake_score(value) => repaired.to_string(),
        _ => value.to_string(),
    }
}

fn mojibake_score(value: &str) -> usize {
    value.chars().filter(|c| *c == 'Ã' || *c == 'Â' || *c == '\u{FFFD}').count()
}

/// First non-empty lines of a text block.
pub fn first_non_empty_lines(text: &str, count: usize) -> Option<String> {
    let lines: Vec<String> = text
        .lines()
        .map(|l| collapse_whitespace(l))
        .filter(|l| !l.is_empty())
        .take(count)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
